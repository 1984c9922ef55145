use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::record::{ClaimDetails, ClaimStatus};

pub const REASON_INACTIVE_POLICY: &str = "inactive policy";
pub const REASON_FILING_WINDOW: &str = "filing window exceeded";

/// Whether a later upload may move a terminal claim again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReopenPolicy {
    /// Terminal statuses are final.
    #[default]
    Never,
    /// A DENIED claim is re-evaluated on every upload; APPROVED stays final.
    AllowDenied,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub status: ClaimStatus,
    pub reason: String,
}

/// The PENDING / APPROVED / DENIED state machine.
///
/// [`DecisionEngine::evaluate`] is a pure function of the claim details, the
/// outstanding documents, the filing window and the evaluation date.
/// [`DecisionEngine::transition`] then applies terminal-state stickiness.
#[derive(Debug, Clone, Copy)]
pub struct DecisionEngine {
    filing_window_days: i64,
    reopen_policy: ReopenPolicy,
}

impl DecisionEngine {
    pub fn new(filing_window_days: i64, reopen_policy: ReopenPolicy) -> Self {
        Self {
            filing_window_days,
            reopen_policy,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.filing_window_days, config.reopen_policy)
    }

    pub fn evaluate(&self, details: &ClaimDetails, remaining: &[String], today: NaiveDate) -> Decision {
        if details.active_policy == Some(false) {
            return Decision {
                status: ClaimStatus::Denied,
                reason: REASON_INACTIVE_POLICY.to_string(),
            };
        }

        if let Some(incident_date) = details.incident_date {
            let elapsed = (today - incident_date).num_days();
            if elapsed > self.filing_window_days {
                return Decision {
                    status: ClaimStatus::Denied,
                    reason: format!(
                        "{REASON_FILING_WINDOW}: incident on {incident_date} was reported {elapsed} days later, limit is {} days",
                        self.filing_window_days
                    ),
                };
            }
        }

        let mut outstanding = Vec::new();
        if !remaining.is_empty() {
            outstanding.push(format!("missing documents: {}", remaining.join(", ")));
        }
        if details.active_policy.is_none() {
            outstanding.push("policy status not yet verified".to_string());
        }
        if details.incident_date.is_none() {
            outstanding.push("incident date not yet known".to_string());
        }
        if !outstanding.is_empty() {
            return Decision {
                status: ClaimStatus::Pending,
                reason: outstanding.join("; "),
            };
        }

        Decision {
            status: ClaimStatus::Approved,
            reason: format!(
                "policy active, reported within {} days, all required documents received",
                self.filing_window_days
            ),
        }
    }

    /// Combines the previous version's decision with a fresh evaluation.
    pub fn transition(&self, previous: Option<&Decision>, evaluated: Decision) -> Decision {
        match previous {
            Some(prev) if prev.status == ClaimStatus::Approved => prev.clone(),
            Some(prev) if prev.status == ClaimStatus::Denied => match self.reopen_policy {
                ReopenPolicy::Never => prev.clone(),
                ReopenPolicy::AllowDenied => evaluated,
            },
            _ => evaluated,
        }
    }

    pub fn decide(
        &self,
        previous: Option<&Decision>,
        details: &ClaimDetails,
        remaining: &[String],
        today: NaiveDate,
    ) -> Decision {
        self.transition(previous, self.evaluate(details, remaining, today))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
    }

    fn verified(days_ago: i64) -> ClaimDetails {
        ClaimDetails {
            active_policy: Some(true),
            incident_date: Some(today() - chrono::Duration::days(days_ago)),
            ..Default::default()
        }
    }

    fn engine() -> DecisionEngine {
        DecisionEngine::new(30, ReopenPolicy::Never)
    }

    #[test]
    fn test_inactive_policy_denies_even_when_complete() {
        let details = ClaimDetails {
            active_policy: Some(false),
            ..verified(2)
        };
        let decision = engine().evaluate(&details, &[], today());
        assert_eq!(decision.status, ClaimStatus::Denied);
        assert_eq!(decision.reason, REASON_INACTIVE_POLICY);
    }

    #[test]
    fn test_filing_window_boundary() {
        let at_limit = engine().evaluate(&verified(30), &[], today());
        assert_eq!(at_limit.status, ClaimStatus::Approved);

        let past_limit = engine().evaluate(&verified(31), &[], today());
        assert_eq!(past_limit.status, ClaimStatus::Denied);
        assert!(past_limit.reason.starts_with(REASON_FILING_WINDOW));
    }

    #[test]
    fn test_future_incident_date_is_within_window() {
        let decision = engine().evaluate(&verified(-3), &[], today());
        assert_eq!(decision.status, ClaimStatus::Approved);
    }

    #[test]
    fn test_missing_documents_keep_claim_pending() {
        let remaining = vec!["Police report".to_string(), "Photo of damage".to_string()];
        let decision = engine().evaluate(&verified(2), &remaining, today());
        assert_eq!(decision.status, ClaimStatus::Pending);
        assert_eq!(
            decision.reason,
            "missing documents: Police report, Photo of damage"
        );
    }

    #[test]
    fn test_unverified_policy_keeps_claim_pending() {
        let details = ClaimDetails {
            active_policy: None,
            ..verified(2)
        };
        let decision = engine().evaluate(&details, &[], today());
        assert_eq!(decision.status, ClaimStatus::Pending);
        assert!(decision.reason.contains("policy status"));
    }

    #[test]
    fn test_evaluation_is_deterministic() {
        let remaining = vec!["Claim form".to_string()];
        let first = engine().evaluate(&verified(5), &remaining, today());
        for _ in 0..10 {
            assert_eq!(engine().evaluate(&verified(5), &remaining, today()), first);
        }
    }

    #[test]
    fn test_terminal_status_is_sticky_by_default() {
        let denied = Decision {
            status: ClaimStatus::Denied,
            reason: REASON_INACTIVE_POLICY.to_string(),
        };
        let decision = engine().decide(Some(&denied), &verified(2), &[], today());
        assert_eq!(decision, denied);

        let approved = engine().evaluate(&verified(2), &[], today());
        let later = engine().decide(
            Some(&approved),
            &ClaimDetails {
                active_policy: Some(false),
                ..verified(2)
            },
            &[],
            today(),
        );
        assert_eq!(later, approved);
    }

    #[test]
    fn test_allow_denied_reopens_on_corrective_upload() {
        let engine = DecisionEngine::new(30, ReopenPolicy::AllowDenied);
        let denied = Decision {
            status: ClaimStatus::Denied,
            reason: REASON_INACTIVE_POLICY.to_string(),
        };
        let remaining = vec!["Repair estimate".to_string()];

        let decision = engine.decide(Some(&denied), &verified(2), &remaining, today());
        assert_eq!(decision.status, ClaimStatus::Pending);

        let approved = engine.evaluate(&verified(2), &[], today());
        let still_approved = engine.decide(
            Some(&approved),
            &ClaimDetails {
                active_policy: Some(false),
                ..verified(2)
            },
            &[],
            today(),
        );
        assert_eq!(still_approved.status, ClaimStatus::Approved);
    }
}
