use thiserror::Error;

use crate::record::ClaimVersion;

/// Errors surfaced by the claim engine.
///
/// Parse degradation and unclassified uploads are deliberately absent: they
/// never fail an upload and travel as [`crate::UploadWarning`]s instead.
#[derive(Error, Debug)]
pub enum ClaimError {
    #[error("Version conflict for claim {claim_id}: attempted {attempted}, latest is {latest}")]
    VersionConflict {
        claim_id: String,
        attempted: ClaimVersion,
        latest: ClaimVersion,
    },

    #[error(
        "Merge for claim {claim_id} gave up after {attempts} attempts; resubmit document {filename}"
    )]
    RetriesExhausted {
        claim_id: String,
        filename: String,
        attempts: u32,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Invalid upload: {0}")]
    InvalidUpload(String),

    #[error("Record belongs to claim {found}, not {expected}")]
    ClaimIdMismatch { expected: String, found: String },

    #[error("Extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("Notification failed: {0}")]
    NotificationFailed(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl ClaimError {
    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        ClaimError::InvalidConfiguration(msg.into())
    }

    pub fn invalid_upload(msg: impl Into<String>) -> Self {
        ClaimError::InvalidUpload(msg.into())
    }

    /// Whether the caller may resubmit the same upload and expect it to succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ClaimError::VersionConflict { .. }
                | ClaimError::RetriesExhausted { .. }
                | ClaimError::StorageError(_)
        )
    }
}

impl From<sqlx::Error> for ClaimError {
    fn from(err: sqlx::Error) -> Self {
        ClaimError::StorageError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ClaimError>;
