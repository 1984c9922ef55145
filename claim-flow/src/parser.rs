//! Lenient conversion of raw AI extraction output into a partial claim.
//!
//! The upstream agent is asked for JSON but answers with whatever it likes:
//! bare JSON, JSON inside prose or code fences, or JSON cut off mid-value.
//! Parsing goes through three stages and never fails; each fallback lowers
//! the reported [`Confidence`]:
//!
//! 1. strict parse of the whole text as a JSON object,
//! 2. strict parse of every top-level balanced `{ ... }` span in the text,
//!    merging the spans that carry claim fields,
//! 3. field-by-field regex recovery of known `"name": value` pairs.
//!
//! A stage that finds no known field hands over to the next one.

use chrono::{DateTime, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::sync::LazyLock;
use tracing::debug;

use crate::record::{ClaimDetails, DamageSeverity};

/// How much of the extraction survived parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    /// The payload parsed structurally and every present value was usable.
    Full,
    /// Some fields were recovered, but not from a clean structured payload.
    Partial,
    /// Nothing usable was found.
    None,
}

impl Confidence {
    pub fn as_str(self) -> &'static str {
        match self {
            Confidence::Full => "full",
            Confidence::Partial => "partial",
            Confidence::None => "none",
        }
    }
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed result of parsing one extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedExtraction {
    pub claim_id: Option<String>,
    pub details: ClaimDetails,
    /// Free-text analysis the agent attached, if any.
    pub narrative: Option<String>,
    pub recovered_fields: BTreeSet<String>,
    pub confidence: Confidence,
}

impl ParsedExtraction {
    pub fn empty() -> Self {
        Self {
            claim_id: None,
            details: ClaimDetails::default(),
            narrative: None,
            recovered_fields: BTreeSet::new(),
            confidence: Confidence::None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum FieldKind {
    Text,
    Flag,
    Money,
    Date,
    Severity,
    List,
    Year,
}

struct FieldSpec {
    name: &'static str,
    aliases: &'static [&'static str],
    kind: FieldKind,
}

const NARRATIVE_ALIASES: &[&str] = &["document_analysis", "notes", "analysis"];

const FIELDS: &[FieldSpec] = &[
    FieldSpec {
        name: "claim_id",
        aliases: &["claim_id", "claimid", "claim id", "claim_number"],
        kind: FieldKind::Text,
    },
    FieldSpec {
        name: "policy_number",
        aliases: &["policy_number", "policynumber", "policy number", "policy_no"],
        kind: FieldKind::Text,
    },
    FieldSpec {
        name: "customer_id",
        aliases: &["customer_id", "customerid", "customer id"],
        kind: FieldKind::Text,
    },
    FieldSpec {
        name: "active_policy",
        aliases: &["active_policy", "policy_active", "is_policy_active"],
        kind: FieldKind::Flag,
    },
    FieldSpec {
        name: "claim_type",
        aliases: &["claim_type", "claimtype", "incident_type"],
        kind: FieldKind::Text,
    },
    FieldSpec {
        name: "coverage_type",
        aliases: &["coverage_type", "coverage"],
        kind: FieldKind::Text,
    },
    FieldSpec {
        name: "deductible",
        aliases: &["deductible"],
        kind: FieldKind::Money,
    },
    FieldSpec {
        name: "incident_date",
        aliases: &["incident_date", "date_of_incident", "incidentdate", "date_of_loss"],
        kind: FieldKind::Date,
    },
    FieldSpec {
        name: "incident_location",
        aliases: &["incident_location", "location"],
        kind: FieldKind::Text,
    },
    FieldSpec {
        name: "damage_description",
        aliases: &["damage_description", "description"],
        kind: FieldKind::Text,
    },
    FieldSpec {
        name: "damage_severity",
        aliases: &["damage_severity", "severity"],
        kind: FieldKind::Severity,
    },
    FieldSpec {
        name: "affected_areas",
        aliases: &["affected_areas", "damaged_areas"],
        kind: FieldKind::List,
    },
    FieldSpec {
        name: "estimated_cost_from_image",
        aliases: &["estimated_cost_from_image", "estimated_cost"],
        kind: FieldKind::Money,
    },
    FieldSpec {
        name: "total_repair_cost",
        aliases: &["total_repair_cost", "repair_cost", "total_cost"],
        kind: FieldKind::Money,
    },
    FieldSpec {
        name: "vehicle_make",
        aliases: &["vehicle_make", "make"],
        kind: FieldKind::Text,
    },
    FieldSpec {
        name: "vehicle_model",
        aliases: &["vehicle_model", "model"],
        kind: FieldKind::Text,
    },
    FieldSpec {
        name: "vehicle_year",
        aliases: &["vehicle_year", "year"],
        kind: FieldKind::Year,
    },
    FieldSpec {
        name: "vehicle_vin",
        aliases: &["vehicle_vin", "vin"],
        kind: FieldKind::Text,
    },
];

static AMOUNT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-?[0-9][0-9,]*(?:\.[0-9]+)?").expect("Invalid regex"));

/// One regex per alias, in field order, for the last-resort recovery stage.
static FIELD_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    FIELDS
        .iter()
        .flat_map(|spec| spec.aliases.iter())
        .chain(NARRATIVE_ALIASES.iter())
        .map(|alias| {
            let pattern = format!(
                r#"(?i)(?:^|[^A-Za-z0-9_])"?{}"?\s*[:=]\s*(?:"((?:[^"\\]|\\.)*)"|(\[[^\]]*\])|([^"\s,}}\]\[][^,}}\r\n]*))"#,
                regex::escape(alias)
            );
            (*alias, Regex::new(&pattern).expect("Invalid regex"))
        })
        .collect()
});

/// Parses raw extraction text. Never fails; see the module docs.
pub fn parse_extraction(raw: &str) -> ParsedExtraction {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(raw.trim()) {
        let flat = flatten(&map);
        if has_known_field(&flat) {
            debug!("Extraction parsed as strict JSON");
            return from_structured(&flat);
        }
    }

    if let Some(parsed) = from_spans(raw) {
        return parsed;
    }

    let recovered = recover_fields(raw);
    let coerced = coerce_fields(&recovered);
    if coerced.recovered.is_empty() {
        debug!("Nothing recoverable in extraction");
        return ParsedExtraction {
            narrative: coerced.narrative,
            ..ParsedExtraction::empty()
        };
    }

    debug!(
        recovered = coerced.recovered.len(),
        "Extraction recovered field by field"
    );
    coerced.into_parsed(Confidence::Partial)
}

/// Merges every embedded object span that carries at least one known field.
/// Earlier spans win on repeated keys unless their value is a placeholder;
/// more than one contributing span caps the result at [`Confidence::Partial`].
fn from_spans(raw: &str) -> Option<ParsedExtraction> {
    let mut merged = Map::new();
    let mut contributing = 0usize;

    for span in balanced_spans(raw) {
        let Ok(Value::Object(map)) = serde_json::from_str::<Value>(span) else {
            continue;
        };
        let flat = flatten(&map);
        if !has_known_field(&flat) {
            debug!(span_len = span.len(), "Skipping embedded JSON span without claim fields");
            continue;
        }
        contributing += 1;
        for (key, value) in flat {
            if merged.get(&key).is_none_or(is_absent) {
                merged.insert(key, value);
            }
        }
    }

    if contributing == 0 {
        return None;
    }

    debug!(spans = contributing, "Extraction parsed from embedded JSON spans");
    let mut parsed = from_structured(&merged);
    if contributing > 1 && parsed.confidence == Confidence::Full {
        parsed.confidence = Confidence::Partial;
    }
    Some(parsed)
}

fn has_known_field(flat: &Map<String, Value>) -> bool {
    FIELDS
        .iter()
        .flat_map(|spec| spec.aliases.iter())
        .any(|alias| flat.get(*alias).is_some_and(|value| !is_absent(value)))
}

fn from_structured(flat: &Map<String, Value>) -> ParsedExtraction {
    let coerced = coerce_fields(flat);
    let confidence = if coerced.recovered.is_empty() {
        Confidence::None
    } else if coerced.rejected.is_empty() {
        Confidence::Full
    } else {
        debug!(rejected = ?coerced.rejected, "Structured extraction had unusable values");
        Confidence::Partial
    };
    coerced.into_parsed(confidence)
}

/// Lifts nested objects (`claim_details`, `vehicle_info`, ...) one level up.
/// Keys are lowercased; the first occurrence of a key wins, top level first.
fn flatten(map: &Map<String, Value>) -> Map<String, Value> {
    let mut flat = Map::new();
    for (key, value) in map {
        if !value.is_object() {
            flat.entry(key.to_lowercase()).or_insert_with(|| value.clone());
        }
    }
    for value in map.values() {
        if let Value::Object(nested) = value {
            for (key, inner) in nested {
                if !inner.is_object() {
                    flat.entry(key.to_lowercase()).or_insert_with(|| inner.clone());
                }
            }
        }
    }
    flat
}

/// Top-level balanced `{ ... }` spans, skipping braces inside string literals.
fn balanced_spans(text: &str) -> Vec<&str> {
    let mut spans = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if depth == 0 {
            if c == '{' {
                start = i;
                depth = 1;
            }
            continue;
        }
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    spans.push(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    spans
}

fn recover_fields(raw: &str) -> Map<String, Value> {
    let mut found = Map::new();
    for (alias, pattern) in FIELD_PATTERNS.iter() {
        if found.contains_key(*alias) {
            continue;
        }
        let Some(caps) = pattern.captures(raw) else {
            continue;
        };
        let value = if let Some(quoted) = caps.get(1) {
            serde_json::from_str::<String>(&format!("\"{}\"", quoted.as_str()))
                .map(Value::String)
                .unwrap_or_else(|_| Value::String(quoted.as_str().to_string()))
        } else if let Some(list) = caps.get(2) {
            serde_json::from_str(list.as_str())
                .unwrap_or_else(|_| Value::String(list.as_str().to_string()))
        } else if let Some(bare) = caps.get(3) {
            let bare = bare.as_str().trim();
            serde_json::from_str(bare).unwrap_or_else(|_| Value::String(bare.to_string()))
        } else {
            continue;
        };
        found.insert(alias.to_string(), value);
    }
    found
}

enum FieldValue {
    Text(String),
    Flag(bool),
    Money(f64),
    Date(NaiveDate),
    Severity(DamageSeverity),
    List(Vec<String>),
    Year(u16),
}

struct Coerced {
    claim_id: Option<String>,
    details: ClaimDetails,
    narrative: Option<String>,
    recovered: BTreeSet<String>,
    rejected: Vec<&'static str>,
}

impl Coerced {
    fn into_parsed(self, confidence: Confidence) -> ParsedExtraction {
        ParsedExtraction {
            claim_id: self.claim_id,
            details: self.details,
            narrative: self.narrative,
            recovered_fields: self.recovered,
            confidence,
        }
    }
}

fn coerce_fields(flat: &Map<String, Value>) -> Coerced {
    let mut coerced = Coerced {
        claim_id: None,
        details: ClaimDetails::default(),
        narrative: NARRATIVE_ALIASES
            .iter()
            .find_map(|alias| flat.get(*alias).and_then(as_text)),
        recovered: BTreeSet::new(),
        rejected: Vec::new(),
    };

    for spec in FIELDS {
        let Some(raw) = spec.aliases.iter().find_map(|alias| flat.get(*alias)) else {
            continue;
        };
        if is_absent(raw) {
            continue;
        }
        match coerce(spec.kind, raw) {
            Some(value) => {
                assign(&mut coerced, spec.name, value);
                coerced.recovered.insert(spec.name.to_string());
            }
            None => {
                debug!(field = spec.name, value = %raw, "Discarding unusable value");
                coerced.rejected.push(spec.name);
            }
        }
    }
    coerced
}

fn assign(coerced: &mut Coerced, name: &str, value: FieldValue) {
    let d = &mut coerced.details;
    match (name, value) {
        ("claim_id", FieldValue::Text(v)) => coerced.claim_id = Some(v),
        ("policy_number", FieldValue::Text(v)) => d.policy_number = Some(v),
        ("customer_id", FieldValue::Text(v)) => d.customer_id = Some(v),
        ("active_policy", FieldValue::Flag(v)) => d.active_policy = Some(v),
        ("claim_type", FieldValue::Text(v)) => d.claim_type = Some(v.to_lowercase()),
        ("coverage_type", FieldValue::Text(v)) => d.coverage_type = Some(v),
        ("deductible", FieldValue::Money(v)) => d.deductible = Some(v),
        ("incident_date", FieldValue::Date(v)) => d.incident_date = Some(v),
        ("incident_location", FieldValue::Text(v)) => d.incident_location = Some(v),
        ("damage_description", FieldValue::Text(v)) => d.damage_description = Some(v),
        ("damage_severity", FieldValue::Severity(v)) => d.damage_severity = Some(v),
        ("affected_areas", FieldValue::List(v)) => d.affected_areas = Some(v),
        ("estimated_cost_from_image", FieldValue::Money(v)) => {
            d.estimated_cost_from_image = Some(v)
        }
        ("total_repair_cost", FieldValue::Money(v)) => d.total_repair_cost = Some(v),
        ("vehicle_make", FieldValue::Text(v)) => d.vehicle_make = Some(v),
        ("vehicle_model", FieldValue::Text(v)) => d.vehicle_model = Some(v),
        ("vehicle_year", FieldValue::Year(v)) => d.vehicle_year = Some(v),
        ("vehicle_vin", FieldValue::Text(v)) => d.vehicle_vin = Some(v),
        _ => {}
    }
}

fn is_placeholder(s: &str) -> bool {
    let t = s.trim();
    if t.is_empty() || (t.starts_with('[') && t.ends_with(']')) {
        return true;
    }
    matches!(
        t.to_lowercase().as_str(),
        "null" | "none" | "n/a" | "na" | "unknown" | "-" | "not present" | "not available"
    )
}

fn is_absent(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => is_placeholder(s),
        Value::Array(items) => items.iter().all(is_absent),
        _ => false,
    }
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !is_placeholder(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn coerce(kind: FieldKind, value: &Value) -> Option<FieldValue> {
    match kind {
        FieldKind::Text => as_text(value).map(FieldValue::Text),
        FieldKind::Flag => as_flag(value).map(FieldValue::Flag),
        FieldKind::Money => as_money(value).map(FieldValue::Money),
        FieldKind::Date => value.as_str().and_then(parse_date).map(FieldValue::Date),
        FieldKind::Severity => value
            .as_str()
            .and_then(|s| s.parse().ok())
            .map(FieldValue::Severity),
        FieldKind::List => as_list(value).map(FieldValue::List),
        FieldKind::Year => as_year(value).map(FieldValue::Year),
    }
}

fn as_flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_i64() {
            Some(1) => Some(true),
            Some(0) => Some(false),
            _ => None,
        },
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "y" | "active" => Some(true),
            "false" | "no" | "n" | "inactive" | "lapsed" | "expired" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn as_money(value: &Value) -> Option<f64> {
    let amount = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let m = AMOUNT_RE.find(s)?;
            m.as_str().replace(',', "").parse::<f64>().ok()?
        }
        _ => return None,
    };
    (amount.is_finite() && amount >= 0.0).then_some(amount)
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d.%m.%Y", "%B %d, %Y", "%b %d, %Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

fn as_list(value: &Value) -> Option<Vec<String>> {
    let items: Vec<String> = match value {
        Value::Array(items) => items.iter().filter_map(as_text).collect(),
        Value::String(s) => s
            .split(',')
            .map(str::trim)
            .filter(|item| !is_placeholder(item))
            .map(str::to_string)
            .collect(),
        _ => return None,
    };
    (!items.is_empty()).then_some(items)
}

fn as_year(value: &Value) -> Option<u16> {
    let year = match value {
        Value::Number(n) => n.as_u64()?,
        Value::String(s) => s.trim().parse::<u64>().ok()?,
        _ => return None,
    };
    (1900..=2100).contains(&year).then_some(year as u16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strict_json_is_full_confidence() {
        let raw = r#"{
            "claim_id": "CLM-1001",
            "claim_details": {
                "policy_number": "AUTO-5678-9012",
                "active_policy": true,
                "incident_date": "2025-05-18",
                "total_repair_cost": "$4,250.50"
            },
            "vehicle_info": { "make": "Honda", "model": "CR-V", "year": 2023 }
        }"#;

        let parsed = parse_extraction(raw);

        assert_eq!(parsed.confidence, Confidence::Full);
        assert_eq!(parsed.claim_id.as_deref(), Some("CLM-1001"));
        assert_eq!(parsed.details.policy_number.as_deref(), Some("AUTO-5678-9012"));
        assert_eq!(parsed.details.active_policy, Some(true));
        assert_eq!(
            parsed.details.incident_date,
            NaiveDate::from_ymd_opt(2025, 5, 18)
        );
        assert_eq!(parsed.details.total_repair_cost, Some(4250.5));
        assert_eq!(parsed.details.vehicle_make.as_deref(), Some("Honda"));
        assert_eq!(parsed.details.vehicle_year, Some(2023));
        assert!(parsed.recovered_fields.contains("vehicle_model"));
    }

    #[test]
    fn test_json_wrapped_in_prose_and_fences() {
        let raw = "Here is what I found in the document:\n```json\n{\"claim_id\": \"CLM-7\", \"claim_details\": {\"customer_id\": \"CUST-1\", \"damage_description\": \"Dent {rear}\"}}\n```\nLet me know if you need more.";

        let parsed = parse_extraction(raw);

        assert_eq!(parsed.confidence, Confidence::Full);
        assert_eq!(parsed.claim_id.as_deref(), Some("CLM-7"));
        assert_eq!(parsed.details.damage_description.as_deref(), Some("Dent {rear}"));
    }

    #[test]
    fn test_truncated_json_recovers_fields_partially() {
        let raw = r#"{"claim_id": "CLM-42", "claim_details": {"policy_number": "AUTO-1234", "active_policy": true, "incident_da"#;

        let parsed = parse_extraction(raw);

        assert_eq!(parsed.confidence, Confidence::Partial);
        assert_eq!(parsed.claim_id.as_deref(), Some("CLM-42"));
        assert_eq!(parsed.details.policy_number.as_deref(), Some("AUTO-1234"));
        assert_eq!(parsed.details.active_policy, Some(true));
        assert_eq!(parsed.details.incident_date, None);
    }

    #[test]
    fn test_garbage_yields_no_confidence() {
        let parsed = parse_extraction("I'm sorry, I could not read this document.");
        assert_eq!(parsed.confidence, Confidence::None);
        assert!(parsed.details.is_empty());
        assert!(parsed.recovered_fields.is_empty());
    }

    #[test]
    fn test_placeholders_are_treated_as_absent() {
        let raw = r#"{"claim_id": "CLM-9", "claim_details": {"policy_number": "[if present]", "customer_id": "N/A", "incident_location": ""}}"#;

        let parsed = parse_extraction(raw);

        assert_eq!(parsed.confidence, Confidence::Full);
        assert_eq!(parsed.details.policy_number, None);
        assert_eq!(parsed.details.customer_id, None);
        assert_eq!(parsed.recovered_fields.len(), 1);
    }

    #[test]
    fn test_unusable_value_downgrades_to_partial() {
        let raw = r#"{"claim_id": "CLM-3", "incident_date": "sometime last week", "active_policy": "yes"}"#;

        let parsed = parse_extraction(raw);

        assert_eq!(parsed.confidence, Confidence::Partial);
        assert_eq!(parsed.details.active_policy, Some(true));
        assert_eq!(parsed.details.incident_date, None);
    }

    #[test]
    fn test_image_analysis_aliases() {
        let raw = r#"{"damage_description": "Crushed rear bumper", "severity": "high", "affected_areas": "bumper, trunk lid", "estimated_cost": 1800, "notes": "Photo is clear"}"#;

        let parsed = parse_extraction(raw);

        assert_eq!(parsed.details.damage_severity, Some(DamageSeverity::Severe));
        assert_eq!(
            parsed.details.affected_areas,
            Some(vec!["bumper".to_string(), "trunk lid".to_string()])
        );
        assert_eq!(parsed.details.estimated_cost_from_image, Some(1800.0));
        assert_eq!(parsed.narrative.as_deref(), Some("Photo is clear"));
    }

    #[test]
    fn test_field_recovery_from_loose_text() {
        let raw = "claim_id: CLM-55\npolicy_number = \"AUTO-9\"\nincident_date: 05/20/2025\nThe vehicle_vin is unknown";

        let parsed = parse_extraction(raw);

        assert_eq!(parsed.confidence, Confidence::Partial);
        assert_eq!(parsed.claim_id.as_deref(), Some("CLM-55"));
        assert_eq!(parsed.details.policy_number.as_deref(), Some("AUTO-9"));
        assert_eq!(
            parsed.details.incident_date,
            NaiveDate::from_ymd_opt(2025, 5, 20)
        );
        assert_eq!(parsed.details.vehicle_vin, None);
    }

    #[test]
    fn test_balanced_spans_ignore_braces_in_strings() {
        let spans = balanced_spans(r#"a {"x": "}"} b {"y": {"z": 1}} c {"#);
        assert_eq!(spans, vec![r#"{"x": "}"}"#, r#"{"y": {"z": 1}}"#]);
    }

    #[test]
    fn test_negative_money_is_rejected() {
        assert_eq!(as_money(&Value::from(-5.0)), None);
        assert_eq!(as_money(&Value::from("USD 1,000")), Some(1000.0));
    }

    #[test]
    fn test_span_without_claim_fields_is_skipped() {
        let raw = "Schema used: {\"type\": \"object\"}\nResult:\n```json\n{\"policy_number\": \"P-1\", \"active_policy\": true}\n```";

        let parsed = parse_extraction(raw);

        assert_eq!(parsed.confidence, Confidence::Full);
        assert_eq!(parsed.details.policy_number.as_deref(), Some("P-1"));
        assert_eq!(parsed.details.active_policy, Some(true));
    }

    #[test]
    fn test_multiple_json_objects_are_merged_partially() {
        let raw = "Claim form:\n```json\n{\"claim_details\": {\"policy_number\": \"P-1\"}}\n```\nPolice report:\n```json\n{\"incident_date\": \"2025-05-30\", \"incident_location\": \"Main St\"}\n```";

        let parsed = parse_extraction(raw);

        assert_eq!(parsed.confidence, Confidence::Partial);
        assert_eq!(parsed.details.policy_number.as_deref(), Some("P-1"));
        assert_eq!(
            parsed.details.incident_date,
            NaiveDate::from_ymd_opt(2025, 5, 30)
        );
        assert_eq!(parsed.details.incident_location.as_deref(), Some("Main St"));
    }

    #[test]
    fn test_earlier_span_wins_unless_placeholder() {
        let raw = r#"first {"claim_id": "CLM-3", "policy_number": "N/A", "customer_id": "CUST-1"} then {"policy_number": "P-5", "customer_id": "CUST-2"}"#;

        let parsed = parse_extraction(raw);

        assert_eq!(parsed.confidence, Confidence::Partial);
        assert_eq!(parsed.claim_id.as_deref(), Some("CLM-3"));
        assert_eq!(parsed.details.policy_number.as_deref(), Some("P-5"));
        assert_eq!(parsed.details.customer_id.as_deref(), Some("CUST-1"));
    }

    #[test]
    fn test_fieldless_span_falls_through_to_text_recovery() {
        let raw = "Output format {\"type\": \"object\"}\npolicy_number: POL-77\nactive_policy: true";

        let parsed = parse_extraction(raw);

        assert_eq!(parsed.confidence, Confidence::Partial);
        assert_eq!(parsed.details.policy_number.as_deref(), Some("POL-77"));
        assert_eq!(parsed.details.active_policy, Some(true));
    }

    #[test]
    fn test_strict_json_with_only_narrative_keeps_narrative() {
        let parsed = parse_extraction(r#"{"notes": "Blurry scan, nothing legible"}"#);

        assert_eq!(parsed.confidence, Confidence::None);
        assert!(parsed.recovered_fields.is_empty());
        assert_eq!(parsed.narrative.as_deref(), Some("Blurry scan, nothing legible"));
    }
}
