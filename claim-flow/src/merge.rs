use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use tracing::info;

use crate::record::{ClaimDetails, ClaimRecord, ClaimVersion};

/// Next version of a claim before documents and status are finalized.
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimDraft {
    pub claim_id: String,
    pub version: ClaimVersion,
    pub claim_details: ClaimDetails,
    pub uploaded_documents: BTreeSet<String>,
    /// Fields whose earlier value was replaced by a different one.
    pub replaced_fields: Vec<&'static str>,
}

/// Combines the latest stored version with one upload's partial fields.
///
/// Per field, the incoming non-null value wins and a null never erases a
/// known value. The uploaded document set only ever grows.
pub fn merge(
    previous: Option<&ClaimRecord>,
    claim_id: &str,
    incoming: &ClaimDetails,
    filename: &str,
    now: DateTime<Utc>,
) -> ClaimDraft {
    let Some(previous) = previous else {
        return ClaimDraft {
            claim_id: claim_id.to_string(),
            version: ClaimVersion::initial(now),
            claim_details: incoming.clone(),
            uploaded_documents: BTreeSet::from([filename.to_string()]),
            replaced_fields: Vec::new(),
        };
    };

    let mut claim_details = previous.claim_details.clone();
    let replaced_fields = claim_details.overlay(incoming);
    if !replaced_fields.is_empty() {
        info!(
            claim_id = %claim_id,
            fields = ?replaced_fields,
            "Conflicting field values resolved in favour of the latest upload"
        );
    }

    let mut uploaded_documents = previous.documents.current_uploaded_documents.clone();
    uploaded_documents.insert(filename.to_string());

    ClaimDraft {
        claim_id: claim_id.to_string(),
        version: ClaimVersion::next_after(&previous.version, now),
        claim_details,
        uploaded_documents,
        replaced_fields,
    }
}
