//! Required-document bookkeeping.
//!
//! Which documents a claim needs is a business rule owned elsewhere and is
//! consumed through [`RequirementsLookup`]. Which label an uploaded file
//! satisfies is decided by a [`DocumentClassifier`]. Both are injected, so
//! [`track`] stays a pure function of its inputs.

use regex::{Regex, RegexBuilder};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::config::EngineConfig;
use crate::error::{ClaimError, Result};
use crate::record::ClaimDetails;

/// Source of required-document labels per claim type.
pub trait RequirementsLookup: Send + Sync {
    /// Labels required for `claim_type`; unknown types fall back to the default type.
    fn required_documents(&self, claim_type: &str) -> Vec<String>;

    fn default_claim_type(&self) -> &str;
}

/// Decides whether an uploaded filename satisfies a required label.
pub trait DocumentClassifier: Send + Sync {
    fn matches(&self, label: &str, filename: &str) -> bool;
}

/// Requirement rules taken from [`EngineConfig::requirements`].
#[derive(Debug, Clone)]
pub struct RequirementRules {
    rules: BTreeMap<String, Vec<String>>,
    default_claim_type: String,
}

impl RequirementRules {
    pub fn from_config(config: &EngineConfig) -> Self {
        let rules = config
            .requirements
            .iter()
            .map(|(claim_type, labels)| (claim_type.to_lowercase(), labels.clone()))
            .collect();
        Self {
            rules,
            default_claim_type: config.default_claim_type.to_lowercase(),
        }
    }
}

impl RequirementsLookup for RequirementRules {
    fn required_documents(&self, claim_type: &str) -> Vec<String> {
        self.rules
            .get(&claim_type.to_lowercase())
            .or_else(|| self.rules.get(&self.default_claim_type))
            .cloned()
            .unwrap_or_default()
    }

    fn default_claim_type(&self) -> &str {
        &self.default_claim_type
    }
}

/// Regex classifier from [`EngineConfig::classifier`].
///
/// Labels without configured patterns match when the filename contains
/// every word of four or more letters from the label ("Police report"
/// matches `police_report_final.pdf`).
pub struct PatternClassifier {
    patterns: HashMap<String, Vec<Regex>>,
}

impl PatternClassifier {
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        let mut patterns = HashMap::new();
        for (label, sources) in &config.classifier {
            let compiled = sources
                .iter()
                .map(|source| {
                    RegexBuilder::new(source)
                        .case_insensitive(true)
                        .build()
                        .map_err(|e| {
                            ClaimError::invalid_configuration(format!(
                                "bad pattern for '{label}': {e}"
                            ))
                        })
                })
                .collect::<Result<Vec<_>>>()?;
            patterns.insert(label.clone(), compiled);
        }
        Ok(Self { patterns })
    }
}

impl DocumentClassifier for PatternClassifier {
    fn matches(&self, label: &str, filename: &str) -> bool {
        let name = basename(filename);
        match self.patterns.get(label) {
            Some(patterns) if !patterns.is_empty() => patterns.iter().any(|p| p.is_match(name)),
            _ => keyword_match(label, name),
        }
    }
}

fn basename(filename: &str) -> &str {
    filename.rsplit(['/', '\\']).next().unwrap_or(filename)
}

fn keyword_match(label: &str, filename: &str) -> bool {
    let filename = filename.to_lowercase();
    let label = label.to_lowercase();
    let words: Vec<&str> = label
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() >= 4)
        .collect();
    if words.is_empty() {
        return filename.contains(&label.replace(' ', "_"));
    }
    words.iter().all(|w| filename.contains(w))
}

/// Required and outstanding documents for one claim version.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentStatus {
    pub claim_type: String,
    /// Required labels in rule order.
    pub required: Vec<String>,
    /// Required labels not matched by any uploaded file, in rule order.
    pub remaining: Vec<String>,
    /// Uploaded files that satisfy no required label.
    pub unclassified: Vec<String>,
}

pub fn track(
    details: &ClaimDetails,
    uploaded: &BTreeSet<String>,
    lookup: &dyn RequirementsLookup,
    classifier: &dyn DocumentClassifier,
) -> DocumentStatus {
    let claim_type = details
        .claim_type
        .clone()
        .unwrap_or_else(|| lookup.default_claim_type().to_string());

    let mut required = Vec::new();
    for label in lookup.required_documents(&claim_type) {
        if !required.contains(&label) {
            required.push(label);
        }
    }

    let remaining = required
        .iter()
        .filter(|label| !uploaded.iter().any(|file| classifier.matches(label, file)))
        .cloned()
        .collect();

    let unclassified = uploaded
        .iter()
        .filter(|file| !required.iter().any(|label| classifier.matches(label, file)))
        .cloned()
        .collect();

    DocumentStatus {
        claim_type,
        required,
        remaining,
        unclassified,
    }
}
