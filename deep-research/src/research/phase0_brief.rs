//! Phase 0: Research brief
//!
//! Turns the raw query into a research brief. The collaborator is asked for
//! `{brief, key_aspects}`; free text is accepted as the brief itself.

use anyhow::Context;
use deep_research_sdk::{ContentGenerator, GenerationRequest, Stage};
use serde::Deserialize;

use crate::research::prompts;
use crate::research::types::Brief;
use crate::workflow_utils::parse_structured;

#[derive(Debug, Deserialize)]
struct BriefDraft {
    brief: String,
    #[serde(default)]
    key_aspects: Vec<String>,
}

/// Parse a brief response, falling back to the trimmed raw text
pub fn parse_brief(response: &str) -> Brief {
    match parse_structured::<BriefDraft>(response) {
        Ok(draft) => {
            let mut text = draft.brief.trim().to_string();
            let aspects: Vec<&str> = draft
                .key_aspects
                .iter()
                .map(|a| a.trim())
                .filter(|a| !a.is_empty())
                .collect();
            if !aspects.is_empty() {
                text.push_str("\n\nKey aspects:\n");
                text.push_str(
                    &aspects
                        .iter()
                        .map(|a| format!("- {}", a))
                        .collect::<Vec<_>>()
                        .join("\n"),
                );
            }
            Brief::new(text)
        }
        Err(_) => Brief::new(response.trim()),
    }
}

pub async fn write_brief(generator: &dyn ContentGenerator, query: &str) -> anyhow::Result<Brief> {
    let request = GenerationRequest::new(Stage::Brief, prompts::brief_prompt(query));
    let response = generator
        .generate(&request)
        .await
        .context("brief generation failed")?;
    Ok(parse_brief(&response))
}
