//! Structural quality gates between stages
//!
//! Each check is pure: it looks at a candidate artifact (plus whatever upstream artifact
//! it is judged against) and returns [`GateVerdict::Pass`] or a diagnostic. These are
//! cardinality and shape checks only, they never grade content.

use regex::Regex;
use std::sync::OnceLock;

use deep_research_sdk::Stage;

use crate::research::errors::StageFailure;
use crate::research::types::{
    Brief, CompressedFindings, Report, ResearchBatch, TopicFindings, TopicOutcome, TopicSet,
};

/// Minimum sizes, counted in characters after trimming surrounding whitespace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateThresholds {
    pub min_brief_chars: usize,
    pub min_topic_chars: usize,
}

impl Default for GateThresholds {
    fn default() -> Self {
        Self {
            min_brief_chars: 40,
            min_topic_chars: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateVerdict {
    Pass,
    Fail(String),
}

impl GateVerdict {
    pub fn is_pass(&self) -> bool {
        matches!(self, GateVerdict::Pass)
    }

    pub fn into_result(self, stage: Stage) -> Result<(), StageFailure> {
        match self {
            GateVerdict::Pass => Ok(()),
            GateVerdict::Fail(reason) => Err(StageFailure::Gate { stage, reason }),
        }
    }
}

fn sources_header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?im)^#{1,2}\s+sources\s*$").expect("sources header regex must compile")
    })
}

/// Any `#` or `##` heading; ends a sources section
fn section_heading_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^#{1,2}\s").expect("heading regex must compile"))
}

fn no_sources_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?im)^[\s>*_-]*no\s+sources?\s+(?:(?:were|was)\s+)?(?:found|available|cited)\b")
            .expect("no-sources statement regex must compile")
    })
}

fn char_len(text: &str) -> usize {
    text.trim().chars().count()
}

/// Body of the first `# Sources` / `## Sources` section, up to the next `#`/`##` heading
pub fn sources_section(markdown: &str) -> Option<&str> {
    let header = sources_header_re().find(markdown)?;
    let body = &markdown[header.end()..];
    let end = section_heading_re()
        .find(body)
        .map_or(body.len(), |heading| heading.start());
    Some(&body[..end])
}

pub fn has_sources_section(markdown: &str) -> bool {
    sources_header_re().is_match(markdown)
}

/// A line stating that nothing was citable, e.g. `No sources were found.`
pub fn states_no_sources(markdown: &str) -> bool {
    no_sources_re().is_match(markdown)
}

pub fn brief(candidate: &Brief, thresholds: &GateThresholds) -> GateVerdict {
    let len = char_len(candidate.text());
    if len == 0 {
        return GateVerdict::Fail("brief is empty".to_string());
    }
    if len < thresholds.min_brief_chars {
        return GateVerdict::Fail(format!(
            "brief is {} characters, minimum is {}",
            len, thresholds.min_brief_chars
        ));
    }
    GateVerdict::Pass
}

pub fn topics(candidate: &TopicSet, thresholds: &GateThresholds) -> GateVerdict {
    if candidate.is_empty() {
        return GateVerdict::Fail("no topics were planned".to_string());
    }

    let short: Vec<String> = candidate
        .iter()
        .enumerate()
        .filter(|(_, topic)| char_len(topic.text()) < thresholds.min_topic_chars)
        .map(|(i, topic)| format!("#{} ({} chars)", i, char_len(topic.text())))
        .collect();

    if short.is_empty() {
        GateVerdict::Pass
    } else {
        GateVerdict::Fail(format!(
            "topics below the {}-character minimum: {}",
            thresholds.min_topic_chars,
            short.join(", ")
        ))
    }
}

/// Applied per task inside the fan-out. Only a failed outcome is rejected;
/// no-sources-found is a legitimate terminal state.
pub fn findings(candidate: &TopicFindings) -> GateVerdict {
    match &candidate.outcome {
        TopicOutcome::Failed { reason } => GateVerdict::Fail(format!(
            "research on topic {} failed: {}",
            candidate.topic_index, reason
        )),
        TopicOutcome::Ok | TopicOutcome::NoSourcesFound => GateVerdict::Pass,
    }
}

pub fn compressed(candidate: &CompressedFindings, batch: &ResearchBatch) -> GateVerdict {
    if char_len(&candidate.summary) == 0 {
        return GateVerdict::Fail("compressed synthesis is empty".to_string());
    }
    if batch.has_ok() && candidate.sources.is_empty() {
        let ok_topics = batch
            .iter()
            .filter(|f| f.is_ok())
            .map(|f| f.topic_index.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        return GateVerdict::Fail(format!(
            "sources were dropped: topics [{}] had sources but the compressed findings cite none",
            ok_topics
        ));
    }
    GateVerdict::Pass
}

pub fn report(candidate: &Report, compressed: &CompressedFindings) -> GateVerdict {
    if char_len(candidate.markdown()) == 0 {
        return GateVerdict::Fail("report is empty".to_string());
    }
    if compressed.sources.is_empty() {
        return GateVerdict::Pass;
    }

    let Some(section) = sources_section(candidate.markdown()) else {
        return GateVerdict::Fail(format!(
            "report has no 'Sources' section but {} source(s) were collected",
            compressed.sources.len()
        ));
    };
    let unlisted: Vec<String> = compressed
        .sources
        .iter()
        .map(|source| source.url.to_string())
        .filter(|url| !section.contains(url.as_str()))
        .collect();
    if unlisted.is_empty() {
        GateVerdict::Pass
    } else {
        GateVerdict::Fail(format!(
            "'Sources' section omits {} of {} collected source(s): {}",
            unlisted.len(),
            compressed.sources.len(),
            unlisted.join(", ")
        ))
    }
}
