//! Context extraction from label markup.
//!
//! The label is flattened into its non-empty text nodes, lower-cased. Each node
//! containing the pattern yields one snippet: the node plus a few neighbours on
//! either side, joined with single spaces.

use quick_xml::events::Event;
use quick_xml::Reader;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::models::ExtractedContext;

/// Pattern the mapper looks for in label text.
pub const INDICATION_PATTERN: &str = "indication";

/// Window and cap settings for [`ContextExtractor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Text nodes kept before the matching node
    pub window_before: usize,
    /// Text nodes kept after the matching node
    pub window_after: usize,
    /// Snippets returned, in document order
    pub max_snippets: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            window_before: 2,
            window_after: 2,
            max_snippets: 1,
        }
    }
}

/// Pure markup-to-snippets extractor.
#[derive(Debug, Clone, Default)]
pub struct ContextExtractor {
    config: ExtractorConfig,
}

impl ContextExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Extract windows of text around `pattern`.
    ///
    /// Never fails: malformed markup or an empty pattern gives an empty
    /// context.
    pub fn extract(&self, document: &str, pattern: &str) -> ExtractedContext {
        let needle = pattern.to_lowercase();
        if needle.is_empty() {
            return ExtractedContext::empty(pattern);
        }

        let nodes = match text_nodes(document) {
            Ok(nodes) => nodes,
            Err(e) => {
                warn!(error = %e, "label markup could not be parsed");
                return ExtractedContext::empty(pattern);
            }
        };

        let snippets: Vec<String> = nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.contains(&needle))
            .take(self.config.max_snippets)
            .map(|(i, _)| self.window(&nodes, i))
            .collect();

        debug!(pattern, nodes = nodes.len(), snippets = snippets.len(), "extracted context");
        ExtractedContext {
            pattern: pattern.to_string(),
            snippets,
        }
    }

    fn window(&self, nodes: &[String], index: usize) -> String {
        let start = index.saturating_sub(self.config.window_before);
        let end = (index + self.config.window_after + 1).min(nodes.len());

        nodes[start..end]
            .iter()
            .map(|n| n.trim())
            .filter(|n| !n.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Extract with the default window and cap.
pub fn extract(document: &str, pattern: &str) -> ExtractedContext {
    ContextExtractor::default().extract(document, pattern)
}

/// Flatten markup into its trimmed, non-empty, lower-cased text nodes.
fn text_nodes(document: &str) -> Result<Vec<String>, quick_xml::Error> {
    let mut reader = Reader::from_str(document);
    reader.config_mut().trim_text(true);

    let mut nodes = Vec::new();
    loop {
        let text = match reader.read_event()? {
            Event::Text(e) => match e.unescape() {
                Ok(text) => text.into_owned(),
                // Undeclared entities (&nbsp; and friends) are common in labels.
                Err(_) => String::from_utf8_lossy(&e).into_owned(),
            },
            Event::CData(e) => String::from_utf8_lossy(&e).into_owned(),
            Event::Eof => break,
            _ => continue,
        };

        let text = text.trim();
        if !text.is_empty() {
            nodes.push(text.to_lowercase());
        }
    }
    Ok(nodes)
}
