use claim_flow::{
    ClaimDetails, ClaimRecord, ClaimStatus, Confidence, UploadOutcome, UploadWarning,
    VersionSummary,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A document that still needs extraction.
#[derive(Debug, Deserialize)]
pub struct DocumentRequest {
    pub claim_id: Option<String>,
    pub filename: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub claim_id: String,
    pub version: String,
    pub status: ClaimStatus,
    pub created_claim: bool,
    pub parse_confidence: Confidence,
    pub recovered_fields: BTreeSet<String>,
    pub warnings: Vec<UploadWarning>,
    pub attempts: u32,
    pub notified: bool,
    pub claim_details: ClaimDetails,
    pub uploaded_documents: BTreeSet<String>,
    pub version_summary: VersionSummary,
}

impl From<UploadOutcome> for UploadResponse {
    fn from(outcome: UploadOutcome) -> Self {
        let record = outcome.record;
        Self {
            claim_id: record.claim_id,
            version: record.version.to_string(),
            status: record.status,
            created_claim: outcome.created_claim,
            parse_confidence: record.parse_confidence,
            recovered_fields: outcome.recovered_fields,
            warnings: outcome.warnings,
            attempts: outcome.attempts,
            notified: outcome.notified,
            claim_details: record.claim_details,
            uploaded_documents: record.documents.current_uploaded_documents,
            version_summary: record.version_summary,
        }
    }
}

/// Compact view of one earlier version.
#[derive(Debug, Serialize)]
pub struct HistoryEntry {
    pub version: String,
    pub status: ClaimStatus,
    pub document_uploaded: String,
    pub uploaded_documents: BTreeSet<String>,
    pub decision_reason: String,
}

impl From<&ClaimRecord> for HistoryEntry {
    fn from(record: &ClaimRecord) -> Self {
        Self {
            version: record.version.to_string(),
            status: record.status,
            document_uploaded: record.version_summary.document_uploaded.clone(),
            uploaded_documents: record.documents.current_uploaded_documents.clone(),
            decision_reason: record.version_summary.decision_reason.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ClaimResponse {
    pub claim_id: String,
    pub version_count: usize,
    pub latest: ClaimRecord,
    /// Prior versions, newest first.
    pub history: Vec<HistoryEntry>,
}

impl ClaimResponse {
    /// None when the lineage is empty.
    pub fn from_versions(claim_id: &str, mut versions: Vec<ClaimRecord>) -> Option<Self> {
        let latest = versions.pop()?;
        Some(Self {
            claim_id: claim_id.to_string(),
            version_count: versions.len() + 1,
            history: versions.iter().rev().map(HistoryEntry::from).collect(),
            latest,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct VersionsResponse {
    pub claim_id: String,
    pub versions: Vec<ClaimRecord>,
}
