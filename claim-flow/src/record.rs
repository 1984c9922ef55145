use chrono::{DateTime, NaiveDate, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::parser::Confidence;

/// Approval state of a claim. `Approved` and `Denied` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClaimStatus {
    Pending,
    Approved,
    Denied,
}

impl ClaimStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ClaimStatus::Approved | ClaimStatus::Denied)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ClaimStatus::Pending => "PENDING",
            ClaimStatus::Approved => "APPROVED",
            ClaimStatus::Denied => "DENIED",
        }
    }
}

impl fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordering key of one claim version.
///
/// The timestamp is truncated to microseconds so that it survives a round
/// trip through storage unchanged; `sequence` breaks ties when two versions
/// are issued within the same microsecond or when the clock steps backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClaimVersion {
    pub issued_at: DateTime<Utc>,
    pub sequence: u32,
}

impl ClaimVersion {
    pub fn initial(now: DateTime<Utc>) -> Self {
        Self {
            issued_at: now.trunc_subsecs(6),
            sequence: 0,
        }
    }

    /// A key strictly greater than `previous`, derived from `now` where possible.
    pub fn next_after(previous: &ClaimVersion, now: DateTime<Utc>) -> Self {
        let now = now.trunc_subsecs(6);
        if now > previous.issued_at {
            Self {
                issued_at: now,
                sequence: 0,
            }
        } else {
            Self {
                issued_at: previous.issued_at,
                sequence: previous.sequence + 1,
            }
        }
    }

    pub fn issued_at_micros(&self) -> i64 {
        self.issued_at.timestamp_micros()
    }

    pub fn from_parts(issued_at_micros: i64, sequence: u32) -> Option<Self> {
        DateTime::from_timestamp_micros(issued_at_micros).map(|issued_at| Self {
            issued_at,
            sequence,
        })
    }
}

impl fmt::Display for ClaimVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}#{}",
            self.issued_at.to_rfc3339_opts(SecondsFormat::Micros, true),
            self.sequence
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DamageSeverity {
    Minor,
    Moderate,
    Severe,
}

impl FromStr for DamageSeverity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "minor" | "low" | "light" => Ok(DamageSeverity::Minor),
            "moderate" | "medium" => Ok(DamageSeverity::Moderate),
            "severe" | "high" | "major" | "total loss" => Ok(DamageSeverity::Severe),
            other => Err(format!("unknown damage severity: {other}")),
        }
    }
}

/// Named claim fields; every field is independently nullable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClaimDetails {
    pub policy_number: Option<String>,
    pub customer_id: Option<String>,
    pub active_policy: Option<bool>,
    pub claim_type: Option<String>,
    pub coverage_type: Option<String>,
    pub deductible: Option<f64>,
    pub incident_date: Option<NaiveDate>,
    pub incident_location: Option<String>,
    pub damage_description: Option<String>,
    pub damage_severity: Option<DamageSeverity>,
    pub affected_areas: Option<Vec<String>>,
    pub estimated_cost_from_image: Option<f64>,
    pub total_repair_cost: Option<f64>,
    pub vehicle_make: Option<String>,
    pub vehicle_model: Option<String>,
    pub vehicle_year: Option<u16>,
    pub vehicle_vin: Option<String>,
}

impl ClaimDetails {
    /// Applies `incoming` on top of `self`, field by field.
    ///
    /// A non-null incoming value replaces the current one; a null incoming
    /// value never erases it. Returns the names of fields whose known value
    /// was replaced by a different one.
    pub fn overlay(&mut self, incoming: &ClaimDetails) -> Vec<&'static str> {
        let mut replaced = Vec::new();
        let r = &mut replaced;
        overlay_field("policy_number", &mut self.policy_number, &incoming.policy_number, r);
        overlay_field("customer_id", &mut self.customer_id, &incoming.customer_id, r);
        overlay_field("active_policy", &mut self.active_policy, &incoming.active_policy, r);
        overlay_field("claim_type", &mut self.claim_type, &incoming.claim_type, r);
        overlay_field("coverage_type", &mut self.coverage_type, &incoming.coverage_type, r);
        overlay_field("deductible", &mut self.deductible, &incoming.deductible, r);
        overlay_field("incident_date", &mut self.incident_date, &incoming.incident_date, r);
        overlay_field(
            "incident_location",
            &mut self.incident_location,
            &incoming.incident_location,
            r,
        );
        overlay_field(
            "damage_description",
            &mut self.damage_description,
            &incoming.damage_description,
            r,
        );
        overlay_field(
            "damage_severity",
            &mut self.damage_severity,
            &incoming.damage_severity,
            r,
        );
        overlay_field("affected_areas", &mut self.affected_areas, &incoming.affected_areas, r);
        overlay_field(
            "estimated_cost_from_image",
            &mut self.estimated_cost_from_image,
            &incoming.estimated_cost_from_image,
            r,
        );
        overlay_field(
            "total_repair_cost",
            &mut self.total_repair_cost,
            &incoming.total_repair_cost,
            r,
        );
        overlay_field("vehicle_make", &mut self.vehicle_make, &incoming.vehicle_make, r);
        overlay_field("vehicle_model", &mut self.vehicle_model, &incoming.vehicle_model, r);
        overlay_field("vehicle_year", &mut self.vehicle_year, &incoming.vehicle_year, r);
        overlay_field("vehicle_vin", &mut self.vehicle_vin, &incoming.vehicle_vin, r);
        replaced
    }

    pub fn is_empty(&self) -> bool {
        *self == ClaimDetails::default()
    }
}

fn overlay_field<T: Clone + PartialEq>(
    name: &'static str,
    slot: &mut Option<T>,
    incoming: &Option<T>,
    replaced: &mut Vec<&'static str>,
) {
    if let Some(value) = incoming {
        if slot.as_ref().is_some_and(|existing| existing != value) {
            replaced.push(name);
        }
        *slot = Some(value.clone());
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClaimDocuments {
    pub current_uploaded_documents: BTreeSet<String>,
    pub required_documents: BTreeSet<String>,
}

/// Human-readable digest of a version, recomputed for every version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionSummary {
    pub claim_status: ClaimStatus,
    pub decision_reason: String,
    pub document_analysis: String,
    pub document_uploaded: String,
    pub next_steps: String,
    pub remaining_requirements: Vec<String>,
}

/// One immutable version of a claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimRecord {
    pub claim_id: String,
    pub version: ClaimVersion,
    pub status: ClaimStatus,
    pub claim_details: ClaimDetails,
    pub documents: ClaimDocuments,
    pub version_summary: VersionSummary,
    pub parse_confidence: Confidence,
}
