//! Indication mapping models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Snippets of label text surrounding a pattern.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ExtractedContext {
    /// Pattern as requested (not lower-cased)
    pub pattern: String,
    /// Lower-cased windows of label text, at most `max_snippets` of them
    pub snippets: Vec<String>,
}

impl ExtractedContext {
    pub fn empty(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            snippets: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.snippets.is_empty()
    }
}

/// Final result of resolving one label to coded indications.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MappingRecord {
    /// DailyMed set ID
    pub identifier: String,
    /// Label title as found in the catalog
    pub title: String,
    /// Label contexts sent to the completion service
    pub contexts: Vec<String>,
    /// Completion output, opaque to this crate
    #[serde(default)]
    pub derived_data: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl MappingRecord {
    pub fn new(
        identifier: impl Into<String>,
        title: impl Into<String>,
        contexts: Vec<String>,
        derived_data: Option<serde_json::Value>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            title: title.into(),
            contexts,
            derived_data,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_json_is_stable() {
        let record = MappingRecord::new(
            "set-1",
            "DUPIXENT",
            vec!["indications and usage".into()],
            Some(serde_json::json!({"text": "{}", "total_tokens": 3})),
        );

        let first = serde_json::to_string(&record).unwrap();
        let reparsed: MappingRecord = serde_json::from_str(&first).unwrap();
        let second = serde_json::to_string(&reparsed).unwrap();

        assert_eq!(record, reparsed);
        assert_eq!(first, second);
    }

    #[test]
    fn test_missing_derived_data_defaults_to_none() {
        let json = r#"{"identifier":"a","title":"b","contexts":[],"created_at":"2024-01-01T00:00:00Z"}"#;
        let record: MappingRecord = serde_json::from_str(json).unwrap();
        assert!(record.derived_data.is_none());
    }

    #[test]
    fn test_empty_context() {
        let ctx = ExtractedContext::empty("indication");
        assert!(ctx.is_empty());
        assert_eq!(ctx.pattern, "indication");
    }
}
