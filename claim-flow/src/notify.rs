use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;
use crate::record::{ClaimRecord, ClaimStatus, VersionSummary};

/// Payload handed to the notification collaborator when a claim turns terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminalNotification {
    pub claim_id: String,
    pub status: ClaimStatus,
    pub version_summary: VersionSummary,
}

impl TerminalNotification {
    pub fn from_record(record: &ClaimRecord) -> Self {
        Self {
            claim_id: record.claim_id.clone(),
            status: record.status,
            version_summary: record.version_summary.clone(),
        }
    }

    pub fn subject(&self) -> String {
        format!("Claim {} {}", self.claim_id, self.status)
    }

    /// Customer-facing message body.
    pub fn message(&self) -> String {
        let outcome = match self.status {
            ClaimStatus::Approved => "has been APPROVED",
            ClaimStatus::Denied => "has been DENIED",
            ClaimStatus::Pending => "is still under review",
        };
        format!(
            "Dear Customer,\n\n\
             Your claim {} {}.\n\n\
             Reason: {}\n\n\
             {}\n\n\
             Next steps: {}\n\n\
             Sincerely,\nClaims Department",
            self.claim_id,
            outcome,
            self.version_summary.decision_reason,
            self.version_summary.document_analysis,
            self.version_summary.next_steps,
        )
    }
}

/// True when `current` is terminal and was not already the previous status.
pub fn should_notify(previous: Option<ClaimStatus>, current: ClaimStatus) -> bool {
    current.is_terminal() && previous != Some(current)
}

/// Delivery side of terminal-status notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &TerminalNotification) -> Result<()>;
}

/// Writes notifications to the log instead of delivering them.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &TerminalNotification) -> Result<()> {
        let payload = serde_json::to_string(notification)?;
        info!(
            claim_id = %notification.claim_id,
            status = %notification.status,
            subject = %notification.subject(),
            message = %notification.message(),
            payload = %payload,
            "Terminal claim notification"
        );
        Ok(())
    }
}
