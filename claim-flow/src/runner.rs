//! ClaimRunner – orchestrates one upload end to end:
//! _parse → load latest → merge → track documents → decide → append_.
//!
//! Uploads for the same claim are serialized through a per-claim lock, and the
//! append is additionally guarded by the repository's strict version check.
//! A [`ClaimError::VersionConflict`] (another process won the race) restarts
//! the merge from the new latest version, up to `max_merge_retries` times.
//!
//! Create the runner once at startup and share it across requests:
//! ```rust,ignore
//! let runner = ClaimRunner::new(&config, Arc::new(InMemoryClaimRepository::new()))?
//!     .with_notifier(Arc::new(LogNotifier));
//! let outcome = runner.process(upload).await?;
//! ```

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    config::EngineConfig,
    decision::{Decision, DecisionEngine},
    documents::{DocumentClassifier, PatternClassifier, RequirementRules, RequirementsLookup, track},
    error::{ClaimError, Result},
    extract::{DocumentRef, Extractor},
    merge::merge,
    notify::{LogNotifier, Notifier, TerminalNotification, should_notify},
    parser::{Confidence, ParsedExtraction, parse_extraction},
    record::{ClaimDocuments, ClaimRecord, ClaimStatus},
    storage::ClaimRepository,
    summary::{SummaryInput, compose},
};

/// Source of "now" for version stamps and filing-window checks.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Always returns the same instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// One document upload together with the raw extraction text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Upload {
    #[serde(default)]
    pub claim_id: Option<String>,
    pub filename: String,
    pub extraction: String,
}

/// Non-fatal observations about an upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UploadWarning {
    ParseDegraded { confidence: Confidence },
    UnclassifiedDocument { filename: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadOutcome {
    pub record: ClaimRecord,
    /// True when this upload started the claim's lineage.
    pub created_claim: bool,
    pub recovered_fields: BTreeSet<String>,
    pub warnings: Vec<UploadWarning>,
    /// Merge attempts, 1 unless a version conflict forced a retry.
    pub attempts: u32,
    pub notified: bool,
}

struct Committed {
    record: ClaimRecord,
    previous_status: Option<ClaimStatus>,
    attempts: u32,
    unclassified: bool,
}

pub struct ClaimRunner {
    repository: Arc<dyn ClaimRepository>,
    requirements: Arc<dyn RequirementsLookup>,
    classifier: Arc<dyn DocumentClassifier>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    extractor: Option<Arc<dyn Extractor>>,
    decision: DecisionEngine,
    max_merge_retries: u32,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl ClaimRunner {
    /// Validates `config` and wires the rule-based lookup and classifier.
    pub fn new(config: &EngineConfig, repository: Arc<dyn ClaimRepository>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            repository,
            requirements: Arc::new(RequirementRules::from_config(config)),
            classifier: Arc::new(PatternClassifier::from_config(config)?),
            notifier: Arc::new(LogNotifier),
            clock: Arc::new(SystemClock),
            extractor: None,
            decision: DecisionEngine::from_config(config),
            max_merge_retries: config.max_merge_retries,
            locks: DashMap::new(),
        })
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_requirements(mut self, requirements: Arc<dyn RequirementsLookup>) -> Self {
        self.requirements = requirements;
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn DocumentClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn Extractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn has_extractor(&self) -> bool {
        self.extractor.is_some()
    }

    pub fn repository(&self) -> &Arc<dyn ClaimRepository> {
        &self.repository
    }

    /// Every stored version of a claim, oldest first.
    pub async fn history(&self, claim_id: &str) -> Result<Vec<ClaimRecord>> {
        self.repository.list_versions(claim_id).await
    }

    /// Runs the configured extractor on `document` and processes the result.
    pub async fn ingest(&self, claim_id: Option<String>, document: DocumentRef) -> Result<UploadOutcome> {
        let extractor = self
            .extractor
            .as_ref()
            .ok_or_else(|| ClaimError::ExtractionFailed("no extractor configured".to_string()))?;

        let extraction = extractor.extract(&document).await?;
        self.process(Upload {
            claim_id,
            filename: document.filename,
            extraction,
        })
        .await
    }

    /// Processes one upload and appends exactly one new claim version.
    pub async fn process(&self, upload: Upload) -> Result<UploadOutcome> {
        let filename = upload.filename.trim();
        if filename.is_empty() {
            return Err(ClaimError::invalid_upload("filename is required"));
        }

        let parsed = parse_extraction(&upload.extraction);
        let claim_id = resolve_claim_id(upload.claim_id.as_deref(), parsed.claim_id.as_deref());
        info!(
            claim_id = %claim_id,
            filename = %filename,
            confidence = %parsed.confidence,
            recovered = parsed.recovered_fields.len(),
            "Processing upload"
        );

        let committed = {
            let claim_lock = self.claim_lock(&claim_id);
            let _guard = claim_lock.mutex.lock().await;
            self.merge_with_retry(&claim_id, filename, &parsed).await
        }?;

        let mut warnings = Vec::new();
        if parsed.confidence != Confidence::Full {
            warnings.push(UploadWarning::ParseDegraded {
                confidence: parsed.confidence,
            });
        }
        if committed.unclassified {
            warnings.push(UploadWarning::UnclassifiedDocument {
                filename: filename.to_string(),
            });
        }

        for warning in &warnings {
            warn!(claim_id = %claim_id, warning = ?warning, "Upload accepted with warning");
        }

        let notified = self.notify_if_terminal(&committed).await;

        info!(
            claim_id = %claim_id,
            version = %committed.record.version,
            status = %committed.record.status,
            attempts = committed.attempts,
            "Claim version committed"
        );

        Ok(UploadOutcome {
            created_claim: committed.previous_status.is_none(),
            recovered_fields: parsed.recovered_fields,
            warnings,
            attempts: committed.attempts,
            notified,
            record: committed.record,
        })
    }

    async fn merge_with_retry(
        &self,
        claim_id: &str,
        filename: &str,
        parsed: &ParsedExtraction,
    ) -> Result<Committed> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let previous = self.repository.get_latest(claim_id).await?;
            let (record, unclassified) =
                self.next_version(previous.as_ref(), claim_id, filename, parsed);

            match self.repository.append(claim_id, record.clone()).await {
                Ok(()) => {
                    return Ok(Committed {
                        record,
                        previous_status: previous.map(|p| p.status),
                        attempts,
                        unclassified,
                    });
                }
                Err(ClaimError::VersionConflict { latest, .. }) if attempts <= self.max_merge_retries => {
                    warn!(
                        claim_id = %claim_id,
                        attempt = attempts,
                        latest = %latest,
                        "Version conflict, re-merging against the new latest version"
                    );
                    tokio::task::yield_now().await;
                }
                Err(ClaimError::VersionConflict { .. }) => {
                    warn!(claim_id = %claim_id, filename = %filename, attempts, "Merge retries exhausted");
                    return Err(ClaimError::RetriesExhausted {
                        claim_id: claim_id.to_string(),
                        filename: filename.to_string(),
                        attempts,
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Builds the candidate next version. Pure apart from reading the clock.
    fn next_version(
        &self,
        previous: Option<&ClaimRecord>,
        claim_id: &str,
        filename: &str,
        parsed: &ParsedExtraction,
    ) -> (ClaimRecord, bool) {
        let now = self.clock.now();
        let draft = merge(previous, claim_id, &parsed.details, filename, now);
        let documents = track(
            &draft.claim_details,
            &draft.uploaded_documents,
            self.requirements.as_ref(),
            self.classifier.as_ref(),
        );

        let previous_decision = previous.map(|p| Decision {
            status: p.status,
            reason: p.version_summary.decision_reason.clone(),
        });
        let decision = self.decision.decide(
            previous_decision.as_ref(),
            &draft.claim_details,
            &documents.remaining,
            now.date_naive(),
        );

        let unclassified = documents.unclassified.iter().any(|f| f == filename);
        let version_summary = compose(&SummaryInput {
            filename,
            parsed,
            details: &draft.claim_details,
            decision: &decision,
            remaining: &documents.remaining,
            unclassified,
        });

        let record = ClaimRecord {
            claim_id: draft.claim_id,
            version: draft.version,
            status: decision.status,
            claim_details: draft.claim_details,
            documents: ClaimDocuments {
                current_uploaded_documents: draft.uploaded_documents,
                required_documents: documents.required.into_iter().collect(),
            },
            version_summary,
            parse_confidence: parsed.confidence,
        };
        (record, unclassified)
    }

    async fn notify_if_terminal(&self, committed: &Committed) -> bool {
        if !should_notify(committed.previous_status, committed.record.status) {
            return false;
        }

        let notification = TerminalNotification::from_record(&committed.record);
        match self.notifier.notify(&notification).await {
            Ok(()) => true,
            Err(e) => {
                // The version is already committed; delivery is best effort.
                warn!(
                    claim_id = %notification.claim_id,
                    status = %notification.status,
                    error = %e,
                    "Failed to deliver terminal notification"
                );
                false
            }
        }
    }

    fn claim_lock(&self, claim_id: &str) -> ClaimLock<'_> {
        let mutex = self
            .locks
            .entry(claim_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        ClaimLock {
            locks: &self.locks,
            claim_id: claim_id.to_string(),
            mutex,
        }
    }
}

/// A claim's entry in the lock table. Dropping the last holder removes the
/// entry, also when the upload future is cancelled while waiting.
struct ClaimLock<'a> {
    locks: &'a DashMap<String, Arc<Mutex<()>>>,
    claim_id: String,
    mutex: Arc<Mutex<()>>,
}

impl Drop for ClaimLock<'_> {
    fn drop(&mut self) {
        // The table's own reference plus ours.
        self.locks.remove_if(&self.claim_id, |_, entry| {
            Arc::ptr_eq(entry, &self.mutex) && Arc::strong_count(entry) == 2
        });
    }
}

/// Caller-supplied id, then the extracted one, then a fresh id.
pub fn resolve_claim_id(requested: Option<&str>, extracted: Option<&str>) -> String {
    requested
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .or_else(|| extracted.map(str::trim).filter(|id| !id.is_empty()))
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}
