//! Phase 4: Final report

use anyhow::Context;
use deep_research_sdk::{ContentGenerator, GenerationRequest, Stage};

use crate::research::gates;
use crate::research::prompts;
use crate::research::types::{Brief, CompressedFindings, Report};

const NO_SOURCES_SECTION: &str = "## Sources\n\nNo sources were found for this research.";

/// Make an empty source list explicit when the collaborator left it unstated
pub fn finalize_report(markdown: &str, compressed: &CompressedFindings) -> Report {
    let markdown = markdown.trim();
    if compressed.sources.is_empty()
        && !gates::has_sources_section(markdown)
        && !gates::states_no_sources(markdown)
    {
        return Report::new(format!("{}\n\n{}\n", markdown, NO_SOURCES_SECTION));
    }
    Report::new(format!("{}\n", markdown))
}

pub async fn write_report(
    generator: &dyn ContentGenerator,
    query: &str,
    brief: &Brief,
    compressed: &CompressedFindings,
) -> anyhow::Result<Report> {
    let prompt = prompts::report_prompt(
        query,
        brief,
        &compressed.summary,
        &compressed.numbered_sources(),
    );
    let request = GenerationRequest::new(Stage::Report, prompt);
    let markdown = generator
        .generate(&request)
        .await
        .context("report generation failed")?;
    Ok(finalize_report(&markdown, compressed))
}
