//! Structured-output utilities: block extraction and typed parsing
//!
//! Collaborators answer structured stages with YAML or JSON, often wrapped in a fenced
//! code block and surrounded by prose. JSON is parsed through the YAML parser.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;

const FENCE: &str = "```";

/// Extract structured content from markdown code blocks or raw text
///
/// Handles:
/// - ```yaml / ```yml / ```json blocks
/// - Generic ``` blocks
/// - Raw text
/// - Removes leading document separator (---)
pub fn extract_yaml(text: &str) -> String {
    let block = match text.find(FENCE) {
        Some(open) => {
            let after_fence = &text[open + FENCE.len()..];
            // Skip the info string (language tag) on the opening fence line
            let body_start = after_fence.find('\n').map(|pos| pos + 1).unwrap_or(0);
            let body = &after_fence[body_start..];
            let body_end = body.rfind(FENCE).unwrap_or(body.len());
            &body[..body_end]
        }
        None => text,
    };

    clean_yaml(block)
}

/// Clean YAML by removing document separators and surrounding whitespace
pub fn clean_yaml(yaml: &str) -> String {
    yaml.trim().trim_start_matches("---").trim().to_string()
}

/// Parse a YAML (or JSON) string into a typed structure
pub fn parse_yaml<T: DeserializeOwned>(yaml: &str) -> Result<T> {
    serde_yaml::from_str(yaml).with_context(|| {
        let preview: String = yaml.chars().take(200).collect();
        format!("Failed to parse structured output; preview: {}", preview)
    })
}

/// Extract the structured block from collaborator text and parse it
pub fn parse_structured<T: DeserializeOwned>(text: &str) -> Result<T> {
    parse_yaml(&extract_yaml(text))
}
