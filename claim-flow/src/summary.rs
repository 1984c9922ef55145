use std::collections::BTreeSet;

use crate::decision::Decision;
use crate::parser::{Confidence, ParsedExtraction};
use crate::record::{ClaimDetails, ClaimStatus, VersionSummary};

/// Everything the per-version summary is rendered from.
pub struct SummaryInput<'a> {
    pub filename: &'a str,
    pub parsed: &'a ParsedExtraction,
    pub details: &'a ClaimDetails,
    pub decision: &'a Decision,
    pub remaining: &'a [String],
    pub unclassified: bool,
}

pub fn compose(input: &SummaryInput<'_>) -> VersionSummary {
    VersionSummary {
        claim_status: input.decision.status,
        decision_reason: input.decision.reason.clone(),
        document_analysis: document_analysis(input),
        document_uploaded: input.filename.to_string(),
        next_steps: next_steps(input.decision, input.remaining),
        remaining_requirements: input.remaining.to_vec(),
    }
}

fn document_analysis(input: &SummaryInput<'_>) -> String {
    let mut sentences = vec![extraction_sentence(
        input.filename,
        input.parsed.confidence,
        &input.parsed.recovered_fields,
    )];

    if input.unclassified {
        sentences.push("The file did not match any required document.".to_string());
    }
    if let Some(narrative) = input.parsed.narrative.as_deref() {
        let narrative = narrative.trim();
        if !narrative.is_empty() {
            sentences.push(narrative.to_string());
        }
    }
    sentences.extend(key_facts(input.details));

    sentences.join(" ")
}

fn extraction_sentence(filename: &str, confidence: Confidence, recovered: &BTreeSet<String>) -> String {
    if recovered.is_empty() {
        return format!("Processed {filename}; no claim fields could be extracted.");
    }
    let fields = recovered.iter().map(String::as_str).collect::<Vec<_>>().join(", ");
    format!("Processed {filename} ({confidence} extraction; recovered {fields}).")
}

fn key_facts(details: &ClaimDetails) -> Vec<String> {
    let mut facts = Vec::new();

    if let Some(policy) = &details.policy_number {
        let state = match details.active_policy {
            Some(true) => "active",
            Some(false) => "inactive",
            None => "unverified",
        };
        facts.push(format!("Policy {policy} is {state}."));
    }

    match (details.incident_date, &details.incident_location) {
        (Some(date), Some(location)) => facts.push(format!("Incident on {date} at {location}.")),
        (Some(date), None) => facts.push(format!("Incident on {date}.")),
        (None, Some(location)) => facts.push(format!("Incident at {location}.")),
        (None, None) => {}
    }

    if let Some(cost) = details.total_repair_cost.or(details.estimated_cost_from_image) {
        facts.push(format!("Estimated repair cost ${cost:.2}."));
    }

    facts
}

fn next_steps(decision: &Decision, remaining: &[String]) -> String {
    match decision.status {
        ClaimStatus::Approved => {
            "No action needed. The claim is approved and will proceed to payment.".to_string()
        }
        ClaimStatus::Denied => format!(
            "The claim was denied ({}). Contact the claims department to discuss the decision.",
            decision.reason
        ),
        ClaimStatus::Pending if !remaining.is_empty() => {
            format!("Please upload the remaining documents: {}.", remaining.join(", "))
        }
        ClaimStatus::Pending => format!(
            "All required documents received. Awaiting {}.",
            decision.reason
        ),
    }
}
