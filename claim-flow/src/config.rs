use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::decision::ReopenPolicy;
use crate::error::{ClaimError, Result};

/// Engine-wide settings, loaded once at startup.
///
/// ```yaml
/// filing_window_days: 30
/// reopen_policy: never
/// requirements:
///   accident: [Claim form, Police report, Photo of damage]
/// classifier:
///   Photo of damage: ['\.(jpe?g|png|gif)$']
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_filing_window_days")]
    pub filing_window_days: i64,
    #[serde(default)]
    pub reopen_policy: ReopenPolicy,
    #[serde(default = "default_max_merge_retries")]
    pub max_merge_retries: u32,
    #[serde(default = "default_claim_type")]
    pub default_claim_type: String,
    /// Claim type -> required document labels.
    pub requirements: BTreeMap<String, Vec<String>>,
    /// Document label -> case-insensitive filename patterns.
    #[serde(default)]
    pub classifier: BTreeMap<String, Vec<String>>,
}

fn default_filing_window_days() -> i64 {
    30
}

fn default_max_merge_retries() -> u32 {
    3
}

fn default_claim_type() -> String {
    "accident".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        let labels = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        let requirements = BTreeMap::from([
            (
                "accident".to_string(),
                labels(&["Claim form", "Police report", "Photo of damage", "Repair estimate"]),
            ),
            (
                "theft".to_string(),
                labels(&["Claim form", "Police report", "Proof of ownership"]),
            ),
        ]);
        let classifier = BTreeMap::from([
            ("Claim form".to_string(), labels(&[r"claim[_\- ]?form", r"\bfnol\b"])),
            ("Police report".to_string(), labels(&[r"police", r"incident[_\- ]?report"])),
            (
                "Photo of damage".to_string(),
                labels(&[r"photo", r"\.(jpe?g|png|gif)$"]),
            ),
            (
                "Repair estimate".to_string(),
                labels(&[r"estimate", r"quote", r"invoice"]),
            ),
            (
                "Proof of ownership".to_string(),
                labels(&[r"ownership", r"title", r"registration"]),
            ),
        ]);

        Self {
            filing_window_days: default_filing_window_days(),
            reopen_policy: ReopenPolicy::default(),
            max_merge_retries: default_max_merge_retries(),
            default_claim_type: default_claim_type(),
            requirements,
            classifier,
        }
    }
}

impl EngineConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: EngineConfig = serde_yaml::from_str(yaml)
            .map_err(|e| ClaimError::invalid_configuration(format!("malformed YAML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            ClaimError::invalid_configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_yaml_str(&yaml)
    }

    pub fn validate(&self) -> Result<()> {
        if self.filing_window_days <= 0 {
            return Err(ClaimError::invalid_configuration(format!(
                "filing_window_days must be positive, got {}",
                self.filing_window_days
            )));
        }
        if self.max_merge_retries == 0 {
            return Err(ClaimError::invalid_configuration(
                "max_merge_retries must be at least 1",
            ));
        }
        if self.requirements.is_empty() {
            return Err(ClaimError::invalid_configuration(
                "no required-document rules configured",
            ));
        }
        let default_type = self.default_claim_type.to_lowercase();
        if !self
            .requirements
            .keys()
            .any(|claim_type| claim_type.to_lowercase() == default_type)
        {
            return Err(ClaimError::invalid_configuration(format!(
                "default claim type '{}' has no requirement rules",
                self.default_claim_type
            )));
        }
        for (claim_type, labels) in &self.requirements {
            if labels.iter().any(|label| label.trim().is_empty()) {
                return Err(ClaimError::invalid_configuration(format!(
                    "blank document label for claim type '{claim_type}'"
                )));
            }
        }
        for (label, patterns) in &self.classifier {
            if !self.requirements.values().flatten().any(|l| l == label) {
                return Err(ClaimError::invalid_configuration(format!(
                    "classifier label '{label}' is not a required document of any claim type"
                )));
            }
            for pattern in patterns {
                RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| {
                        ClaimError::invalid_configuration(format!(
                            "bad pattern for '{label}': {e}"
                        ))
                    })?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.filing_window_days, 30);
        assert_eq!(config.reopen_policy, ReopenPolicy::Never);
    }

    #[test]
    fn test_shipped_yaml_matches_builtin_rules() {
        let shipped = EngineConfig::from_yaml_str(include_str!("../../config/claims.yaml")).unwrap();
        assert_eq!(shipped, EngineConfig::default());
    }

    #[test]
    fn test_yaml_defaults_optional_fields() {
        let config = EngineConfig::from_yaml_str(
            "requirements:\n  accident:\n    - Claim form\n    - Photo of damage\n",
        )
        .unwrap();

        assert_eq!(config.filing_window_days, 30);
        assert_eq!(config.max_merge_retries, 3);
        assert_eq!(config.requirements["accident"].len(), 2);
        assert!(config.classifier.is_empty());
    }

    #[test]
    fn test_yaml_reopen_policy() {
        let config = EngineConfig::from_yaml_str(
            "reopen_policy: allow_denied\nrequirements:\n  accident: [Claim form]\n",
        )
        .unwrap();
        assert_eq!(config.reopen_policy, ReopenPolicy::AllowDenied);
    }

    #[test]
    fn test_missing_requirements_is_invalid() {
        let err = EngineConfig::from_yaml_str("filing_window_days: 30\n").unwrap_err();
        assert!(matches!(err, ClaimError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_non_positive_window_is_invalid() {
        let err = EngineConfig::from_yaml_str(
            "filing_window_days: 0\nrequirements:\n  accident: [Claim form]\n",
        )
        .unwrap_err();
        assert!(matches!(err, ClaimError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_default_type_must_have_rules() {
        let err = EngineConfig::from_yaml_str(
            "default_claim_type: flood\nrequirements:\n  accident: [Claim form]\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("flood"));
    }

    #[test]
    fn test_bad_classifier_pattern_is_invalid() {
        let err = EngineConfig::from_yaml_str(
            "requirements:\n  accident: [Claim form]\nclassifier:\n  Claim form: ['(unclosed']\n",
        )
        .unwrap_err();
        assert!(matches!(err, ClaimError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_unknown_file_is_invalid() {
        let err = EngineConfig::from_file("/nonexistent/claims.yaml").unwrap_err();
        assert!(matches!(err, ClaimError::InvalidConfiguration(_)));
    }
}
