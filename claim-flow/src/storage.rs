use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

use crate::{
    error::{ClaimError, Result},
    record::ClaimRecord,
};

/// Append-only, versioned store of claim records keyed by claim id.
#[async_trait]
pub trait ClaimRepository: Send + Sync {
    /// The most recent version of a claim, if the lineage exists.
    async fn get_latest(&self, claim_id: &str) -> Result<Option<ClaimRecord>>;

    /// Appends a new version.
    ///
    /// Fails with [`ClaimError::VersionConflict`] unless `record.version` is
    /// strictly greater than the latest stored version.
    async fn append(&self, claim_id: &str, record: ClaimRecord) -> Result<()>;

    /// Every version of a claim, oldest first.
    async fn list_versions(&self, claim_id: &str) -> Result<Vec<ClaimRecord>>;
}

pub(crate) fn ensure_same_claim(claim_id: &str, record: &ClaimRecord) -> Result<()> {
    if record.claim_id != claim_id {
        return Err(ClaimError::ClaimIdMismatch {
            expected: claim_id.to_string(),
            found: record.claim_id.clone(),
        });
    }
    Ok(())
}

/// In-memory implementation of ClaimRepository
pub struct InMemoryClaimRepository {
    lineages: Arc<DashMap<String, Vec<ClaimRecord>>>,
}

impl InMemoryClaimRepository {
    pub fn new() -> Self {
        Self {
            lineages: Arc::new(DashMap::new()),
        }
    }
}

impl Default for InMemoryClaimRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClaimRepository for InMemoryClaimRepository {
    async fn get_latest(&self, claim_id: &str) -> Result<Option<ClaimRecord>> {
        Ok(self
            .lineages
            .get(claim_id)
            .and_then(|versions| versions.last().cloned()))
    }

    async fn append(&self, claim_id: &str, record: ClaimRecord) -> Result<()> {
        ensure_same_claim(claim_id, &record)?;

        // The entry guard holds the shard lock, so check-and-push is atomic.
        let mut versions = self.lineages.entry(claim_id.to_string()).or_default();
        if let Some(latest) = versions.last() {
            if record.version <= latest.version {
                return Err(ClaimError::VersionConflict {
                    claim_id: claim_id.to_string(),
                    attempted: record.version,
                    latest: latest.version,
                });
            }
        }
        versions.push(record);
        Ok(())
    }

    async fn list_versions(&self, claim_id: &str) -> Result<Vec<ClaimRecord>> {
        Ok(self
            .lineages
            .get(claim_id)
            .map(|versions| versions.clone())
            .unwrap_or_default())
    }
}
