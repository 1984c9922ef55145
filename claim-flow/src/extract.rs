//! The upstream AI extraction capability.
//!
//! The engine never reads documents itself; it only needs *some* text back
//! from whatever model looked at the document. Tests inject canned
//! extractors, the service injects [`RigExtractor`] when the `rig` feature
//! is enabled.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

const IMAGE_EXTENSIONS: &[&str] = &[".png", ".jpg", ".jpeg", ".gif"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Image,
    Document,
}

impl DocumentKind {
    pub fn from_filename(filename: &str) -> Self {
        let lower = filename.to_lowercase();
        if IMAGE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) {
            DocumentKind::Image
        } else {
            DocumentKind::Document
        }
    }
}

/// An uploaded document as handed to the extractor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRef {
    pub filename: String,
    /// Document text, or an encoded image payload for image uploads.
    pub content: String,
}

impl DocumentRef {
    pub fn kind(&self) -> DocumentKind {
        DocumentKind::from_filename(&self.filename)
    }
}

#[async_trait]
pub trait Extractor: Send + Sync {
    /// Raw model output for one document. Shape is not guaranteed.
    async fn extract(&self, document: &DocumentRef) -> Result<String>;
}

#[cfg(feature = "rig")]
pub use rig_extractor::RigExtractor;

#[cfg(feature = "rig")]
mod rig_extractor {
    use async_trait::async_trait;
    use rig::{agent::Agent, client::CompletionClient, completion::Prompt, providers::openrouter};
    use tracing::info;

    use super::{DocumentKind, DocumentRef, Extractor};
    use crate::error::{ClaimError, Result};

    const DOCUMENT_EXTRACTION_PROMPT: &str = r#"
You are an auto insurance claims intake specialist. Read the document and extract claim data.

Respond with ONLY this JSON (no explanation, no additional text). Omit fields you cannot find:
{
  "claim_id": "claim identifier printed on the document",
  "claim_details": {
    "policy_number": "...",
    "customer_id": "...",
    "active_policy": true,
    "claim_type": "accident or theft",
    "coverage_type": "...",
    "deductible": 500.00,
    "incident_date": "YYYY-MM-DD",
    "incident_location": "...",
    "total_repair_cost": 1500.00
  },
  "vehicle_info": { "make": "...", "model": "...", "year": 2023, "vin": "..." },
  "document_analysis": "two or three sentences summarising the document"
}
"#;

    const IMAGE_EXTRACTION_PROMPT: &str = r#"
You are a vehicle damage assessor. Look at the photo and describe the damage.

Respond with ONLY this JSON (no explanation, no additional text). Omit fields you cannot determine:
{
  "claim_id": "claim identifier if visible in the image",
  "damage_description": "what is damaged and how",
  "damage_severity": "minor, moderate or severe",
  "affected_areas": ["front bumper", "hood"],
  "estimated_cost": 1200.00,
  "vehicle_info": { "make": "...", "model": "...", "year": 2023 },
  "notes": "anything else relevant"
}
"#;

    /// OpenRouter-backed extractor built on rig agents.
    pub struct RigExtractor {
        api_key: String,
        model: String,
    }

    impl RigExtractor {
        pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
            Self {
                api_key: api_key.into(),
                model: model.into(),
            }
        }

        pub fn from_env() -> anyhow::Result<Self> {
            let api_key = std::env::var("OPENROUTER_API_KEY")
                .map_err(|_| anyhow::anyhow!("OPENROUTER_API_KEY not set"))?;
            let model = std::env::var("EXTRACTION_MODEL")
                .unwrap_or_else(|_| "openai/gpt-4o-mini".to_string());
            Ok(Self::new(api_key, model))
        }

        fn agent(&self, prompt: &str) -> Agent<openrouter::CompletionModel> {
            let client = openrouter::Client::new(&self.api_key);
            client.agent(&self.model).preamble(prompt).build()
        }
    }

    #[async_trait]
    impl Extractor for RigExtractor {
        async fn extract(&self, document: &DocumentRef) -> Result<String> {
            let kind = document.kind();
            info!(filename = %document.filename, kind = ?kind, "Requesting extraction");

            let prompt = match kind {
                DocumentKind::Image => IMAGE_EXTRACTION_PROMPT,
                DocumentKind::Document => DOCUMENT_EXTRACTION_PROMPT,
            };
            let input = format!(
                "File name: {}\n\n{}",
                document.filename, document.content
            );

            self.agent(prompt)
                .prompt(input)
                .await
                .map_err(|e| ClaimError::ExtractionFailed(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_kind_from_extension() {
        assert_eq!(DocumentKind::from_filename("rear.JPEG"), DocumentKind::Image);
        assert_eq!(DocumentKind::from_filename("dent.png"), DocumentKind::Image);
        assert_eq!(
            DocumentKind::from_filename("claim_form.pdf"),
            DocumentKind::Document
        );
        assert_eq!(
            DocumentKind::from_filename("png_notes.txt"),
            DocumentKind::Document
        );
    }
}
