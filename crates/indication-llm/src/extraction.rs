//! ICD-10 mapping extraction from completion output.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Extraction errors.
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid response format: {0}")]
    InvalidFormat(String),
}

pub type ExtractionResult<T> = Result<T, ExtractionError>;

/// Structured mapping document produced by the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MappingOutput {
    #[serde(default)]
    pub drug_name: Option<String>,
    #[serde(default)]
    pub extracted_indications: Vec<CodedIndication>,
    #[serde(default)]
    pub unmappable_terms: Vec<UnmappableTerm>,
}

/// One indication mapped to an ICD-10 code.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CodedIndication {
    pub raw_text: String,
    pub condition: String,
    pub icd10_code: String,
    pub icd10_description: String,
    pub confidence: Confidence,
    #[serde(default)]
    pub reasoning: Option<String>,
    #[serde(default)]
    pub is_off_label: bool,
}

/// Model-reported confidence bucket.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Confidence {
    High,
    Medium,
    Low,
}

/// A term the model could not map.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnmappableTerm {
    pub term: String,
    pub reason: String,
}

impl MappingOutput {
    /// ICD-10 codes in the order the model listed them.
    pub fn codes(&self) -> Vec<&str> {
        self.extracted_indications
            .iter()
            .map(|i| i.icd10_code.as_str())
            .collect()
    }
}

/// Parse completion text into a [`MappingOutput`].
///
/// Models often wrap the JSON in prose or code fences, so the outermost
/// `{ ... }` span is parsed.
pub fn parse_mapping_output(text: &str) -> ExtractionResult<MappingOutput> {
    let json_start = text.find('{').ok_or_else(|| {
        ExtractionError::InvalidFormat("No JSON object found in response".into())
    })?;
    let json_end = text.rfind('}').ok_or_else(|| {
        ExtractionError::InvalidFormat("No closing brace found in response".into())
    })?;
    if json_end < json_start {
        return Err(ExtractionError::InvalidFormat(
            "Closing brace precedes opening brace".into(),
        ));
    }

    let output: MappingOutput = serde_json::from_str(&text[json_start..=json_end])?;
    Ok(output)
}
