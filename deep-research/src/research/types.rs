//! Data structures for research runs

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use url::Url;

use crate::research::errors::TaskFailure;

/// Serialized form of [`SourceUrl::NotFound`]
pub const NO_SOURCE_SENTINEL: &str = "no-source-found";

/// Synthesized research brief
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Brief(String);

impl Brief {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn text(&self) -> &str {
        &self.0
    }
}

/// One planned subtopic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    pub topic: String,
}

impl Topic {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
        }
    }

    pub fn text(&self) -> &str {
        &self.topic
    }
}

/// Ordered topics planned from a brief; positions are the fan-out task indices
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicSet {
    pub topics: Vec<Topic>,
}

impl TopicSet {
    pub fn new(topics: Vec<Topic>) -> Self {
        Self { topics }
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Topic> {
        self.topics.iter()
    }

    pub fn get(&self, index: usize) -> Option<&Topic> {
        self.topics.get(index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid source url `{0}`: expected an http(s) url or `no-source-found`")]
pub struct InvalidSourceUrl(pub String);

/// Citation target: a web url, or the explicit "no source found" sentinel
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SourceUrl {
    Found(Url),
    NotFound,
}

impl SourceUrl {
    pub fn parse(raw: &str) -> Result<Self, InvalidSourceUrl> {
        let raw = raw.trim();
        if raw == NO_SOURCE_SENTINEL {
            return Ok(SourceUrl::NotFound);
        }
        match Url::parse(raw) {
            Ok(url) if matches!(url.scheme(), "http" | "https") && url.host().is_some() => {
                Ok(SourceUrl::Found(url))
            }
            _ => Err(InvalidSourceUrl(raw.to_string())),
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, SourceUrl::Found(_))
    }
}

impl TryFrom<String> for SourceUrl {
    type Error = InvalidSourceUrl;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        SourceUrl::parse(&value)
    }
}

impl From<SourceUrl> for String {
    fn from(value: SourceUrl) -> Self {
        value.to_string()
    }
}

impl fmt::Display for SourceUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceUrl::Found(url) => f.write_str(url.as_str()),
            SourceUrl::NotFound => f.write_str(NO_SOURCE_SENTINEL),
        }
    }
}

/// A citation. Two sources are the same source when their urls match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub title: String,
    pub url: SourceUrl,
}

impl Source {
    /// Empty titles fall back to the url so every citation has a label
    pub fn new(title: impl Into<String>, url: SourceUrl) -> Self {
        let title = title.into().trim().to_string();
        let title = if title.is_empty() {
            url.to_string()
        } else {
            title
        };
        Self { title, url }
    }

    pub fn parse(title: &str, url: &str) -> Result<Self, InvalidSourceUrl> {
        Ok(Self::new(title, SourceUrl::parse(url)?))
    }
}

impl PartialEq for Source {
    fn eq(&self, other: &Self) -> bool {
        self.url == other.url
    }
}

impl Eq for Source {}

impl Hash for Source {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.url.hash(state);
    }
}

/// Collapse duplicate urls (first-seen title wins) and drop sentinels, keeping order
pub fn normalize_sources<I>(sources: I) -> Vec<Source>
where
    I: IntoIterator<Item = Source>,
{
    let mut seen = HashSet::new();
    sources
        .into_iter()
        .filter(|source| source.url.is_found())
        .filter(|source| seen.insert(source.url.clone()))
        .collect()
}

/// Terminal state of one topic's research
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TopicOutcome {
    Ok,
    /// Research completed but nothing citable was found
    NoSourcesFound,
    Failed { reason: String },
}

impl TopicOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            TopicOutcome::Ok => "ok",
            TopicOutcome::NoSourcesFound => "no sources found",
            TopicOutcome::Failed { .. } => "failed",
        }
    }
}

/// Result of researching one topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicFindings {
    pub topic_index: usize,
    pub topic: Topic,
    pub summary: String,
    pub sources: Vec<Source>,
    pub outcome: TopicOutcome,
}

impl TopicFindings {
    /// Finished research; the outcome follows from whether any real source survived
    pub fn completed(
        topic_index: usize,
        topic: Topic,
        summary: impl Into<String>,
        sources: Vec<Source>,
    ) -> Self {
        let sources = normalize_sources(sources);
        let outcome = if sources.is_empty() {
            TopicOutcome::NoSourcesFound
        } else {
            TopicOutcome::Ok
        };
        Self {
            topic_index,
            topic,
            summary: summary.into(),
            sources,
            outcome,
        }
    }

    pub fn failed(topic_index: usize, topic: Topic, reason: impl Into<String>) -> Self {
        Self {
            topic_index,
            topic,
            summary: String::new(),
            sources: Vec::new(),
            outcome: TopicOutcome::Failed {
                reason: reason.into(),
            },
        }
    }

    pub fn is_ok(&self) -> bool {
        self.outcome == TopicOutcome::Ok
    }

    /// Usable downstream: ok or no-sources-found
    pub fn is_usable(&self) -> bool {
        !matches!(self.outcome, TopicOutcome::Failed { .. })
    }
}

/// Per-topic outcomes for a whole topic set, in topic order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResearchBatch {
    findings: Vec<TopicFindings>,
}

impl ResearchBatch {
    /// Slots are ordered by topic index regardless of the order they arrive in
    pub fn new(mut findings: Vec<TopicFindings>) -> Self {
        findings.sort_by_key(|f| f.topic_index);
        Self { findings }
    }

    pub fn len(&self) -> usize {
        self.findings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn get(&self, topic_index: usize) -> Option<&TopicFindings> {
        self.findings.iter().find(|f| f.topic_index == topic_index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TopicFindings> {
        self.findings.iter()
    }

    pub fn usable(&self) -> impl Iterator<Item = &TopicFindings> {
        self.findings.iter().filter(|f| f.is_usable())
    }

    pub fn has_ok(&self) -> bool {
        self.findings.iter().any(TopicFindings::is_ok)
    }

    /// At least one topic reached ok or no-sources-found
    pub fn is_usable(&self) -> bool {
        self.findings.iter().any(TopicFindings::is_usable)
    }

    pub fn failures(&self) -> Vec<TaskFailure> {
        self.findings
            .iter()
            .filter_map(|f| match &f.outcome {
                TopicOutcome::Failed { reason } => Some(TaskFailure {
                    topic_index: f.topic_index,
                    reason: reason.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    /// Union of sources from usable topics, in topic order
    pub fn sources(&self) -> Vec<Source> {
        normalize_sources(self.usable().flat_map(|f| f.sources.iter().cloned()))
    }
}

/// Deduplicated synthesis plus every source it draws on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressedFindings {
    pub summary: String,
    pub sources: Vec<Source>,
}

impl CompressedFindings {
    /// `[n] Title - url` lines, numbered from 1 in citation order
    pub fn numbered_sources(&self) -> String {
        self.sources
            .iter()
            .enumerate()
            .map(|(i, s)| format!("[{}] {} - {}", i + 1, s.title, s.url))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Final markdown report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Report(String);

impl Report {
    pub fn new(markdown: impl Into<String>) -> Self {
        Self(markdown.into())
    }

    pub fn markdown(&self) -> &str {
        &self.0
    }

    pub fn into_markdown(self) -> String {
        self.0
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
