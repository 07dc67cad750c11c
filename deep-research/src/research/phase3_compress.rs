//! Phase 3: Compression
//!
//! The collaborator deduplicates and organizes the usable findings into one synthesis.
//! Source bookkeeping stays here: the compressed source list is the normalized union of
//! the usable findings' sources in topic order, so citation numbers are reproducible.

use anyhow::Context;
use deep_research_sdk::{ContentGenerator, GenerationRequest, Stage};

use crate::research::prompts;
use crate::research::types::{CompressedFindings, ResearchBatch, Source};

/// Render usable findings for the compression prompt, numbering sources globally
pub fn render_findings(batch: &ResearchBatch, sources: &[Source]) -> String {
    batch
        .usable()
        .map(|findings| {
            let cited = findings
                .sources
                .iter()
                .filter_map(|source| {
                    sources
                        .iter()
                        .position(|s| s == source)
                        .map(|n| format!("[{}] {} - {}", n + 1, source.title, source.url))
                })
                .collect::<Vec<_>>();
            let cited = if cited.is_empty() {
                "(none)".to_string()
            } else {
                cited.join("\n")
            };
            format!(
                "### Topic {}: {}\nStatus: {}\n\n{}\n\nSources:\n{}",
                findings.topic_index,
                findings.topic.text(),
                findings.outcome.label(),
                findings.summary.trim(),
                cited
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub async fn compress_findings(
    generator: &dyn ContentGenerator,
    batch: &ResearchBatch,
) -> anyhow::Result<CompressedFindings> {
    let sources = batch.sources();
    let prompt = prompts::compress_prompt(&render_findings(batch, &sources));
    let request = GenerationRequest::new(Stage::Compress, prompt);
    let summary = generator
        .generate(&request)
        .await
        .context("compression failed")?;

    Ok(CompressedFindings {
        summary: summary.trim().to_string(),
        sources,
    })
}
