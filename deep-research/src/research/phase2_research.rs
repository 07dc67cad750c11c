//! Phase 2: Parallel per-topic research
//!
//! Each topic gets one research task: a loop of collaborator turns that either ask for a
//! search or finish with findings. The task owns the search budget; once
//! `max_searches` searches were issued it stops searching no matter what the
//! collaborator asks for, and finalizes from the results it already has.
//!
//! Tasks run through [`execute_batch`] under the concurrency cap. A failed, timed-out or
//! panicking task only fails its own slot. The batch is usable as long as one topic ends
//! `ok` or `no-sources-found`.

use anyhow::{anyhow, bail, Context};
use futures::StreamExt;
use serde::{Deserialize, Deserializer};
use std::future::Future;
use std::time::Duration;

use deep_research_sdk::{
    log_task_progress, log_task_skipped, ContentGenerator, GenerationRequest, SearchHit,
    SearchProvider, Stage,
};

use crate::research::artifacts::StageKey;
use crate::research::errors::StageFailure;
use crate::research::gates;
use crate::research::prompts;
use crate::research::stage::StageRunner;
use crate::research::types::{
    normalize_sources, ResearchBatch, Source, SourceUrl, Topic, TopicFindings, TopicSet,
};
use crate::workflow_utils::{execute_batch, execute_task, parse_structured};

/// Fan-out limits
#[derive(Debug, Clone, Copy)]
pub struct FanOutSettings {
    pub max_concurrency: usize,
    pub task_timeout: Option<Duration>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CitedSource {
    Entry {
        #[serde(default)]
        title: String,
        url: String,
    },
    Url(String),
}

impl CitedSource {
    fn parse(self) -> Option<Source> {
        let (title, url) = match self {
            CitedSource::Entry { title, url } => (title, url),
            CitedSource::Url(url) => (String::new(), url),
        };
        match SourceUrl::parse(&url) {
            Ok(url) => Some(Source::new(title, url)),
            Err(e) => {
                tracing::debug!(error = %e, "dropping unparseable citation");
                None
            }
        }
    }
}

/// A bare `sources:` key means nothing was cited, same as a missing one
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// One collaborator turn inside a research task
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum ResearchStep {
    Search {
        query: String,
    },
    Finish {
        findings: String,
        #[serde(default, deserialize_with = "null_as_empty")]
        sources: Vec<CitedSource>,
    },
}

pub fn task_id(topic_index: usize) -> String {
    format!("research_{}", topic_index)
}

/// Drives the search/finish loop for one topic
pub struct Researcher<'a> {
    generator: &'a dyn ContentGenerator,
    search: &'a dyn SearchProvider,
    max_searches: usize,
    hits_per_search: usize,
}

impl<'a> Researcher<'a> {
    pub fn new(
        generator: &'a dyn ContentGenerator,
        search: &'a dyn SearchProvider,
        max_searches: usize,
        hits_per_search: usize,
    ) -> Self {
        Self {
            generator,
            search,
            max_searches,
            hits_per_search,
        }
    }

    /// Research one topic. Issues at most `max_searches` searches and at most
    /// `max_searches + 1` collaborator turns.
    pub async fn research(&self, topic_index: usize, topic: &Topic) -> anyhow::Result<TopicFindings> {
        let task_id = task_id(topic_index);
        let mut hits: Vec<SearchHit> = Vec::new();
        let mut searches = 0;

        loop {
            let prompt = prompts::research_prompt(topic, &hits, searches, self.max_searches);
            let request = GenerationRequest::new(Stage::Research, prompt).for_topic(topic_index);
            let response = self
                .generator
                .generate(&request)
                .await
                .with_context(|| format!("research turn {} failed", searches + 1))?;
            let step: ResearchStep = parse_structured(&response)
                .context("research step is neither a search nor a finish action")?;

            match step {
                ResearchStep::Finish { findings, sources } => {
                    return finish(topic_index, topic, findings, sources);
                }
                ResearchStep::Search { query } if searches < self.max_searches => {
                    searches += 1;
                    log_task_progress!(
                        &task_id,
                        format!("search {}/{}: {}", searches, self.max_searches, query)
                    );
                    let stream = self
                        .search
                        .search(&query)
                        .await
                        .with_context(|| format!("search for '{}' failed", query))?;
                    let found: Vec<SearchHit> = stream.take(self.hits_per_search).collect().await;
                    tracing::debug!(topic_index, searches, hits = found.len(), "search completed");
                    hits.extend(found);
                }
                ResearchStep::Search { query } => {
                    tracing::info!(
                        topic_index,
                        searches,
                        %query,
                        "search budget exhausted, finalizing from accumulated results"
                    );
                    return Ok(findings_from_hits(topic_index, topic, &hits));
                }
            }
        }
    }
}

fn finish(
    topic_index: usize,
    topic: &Topic,
    findings: String,
    sources: Vec<CitedSource>,
) -> anyhow::Result<TopicFindings> {
    if findings.trim().is_empty() {
        bail!("research finished with empty findings");
    }
    let sources = sources.into_iter().filter_map(CitedSource::parse).collect();
    Ok(TopicFindings::completed(
        topic_index,
        topic.clone(),
        findings.trim(),
        sources,
    ))
}

/// Findings assembled from raw search results when the budget ran out before a finish
pub fn findings_from_hits(topic_index: usize, topic: &Topic, hits: &[SearchHit]) -> TopicFindings {
    if hits.is_empty() {
        return TopicFindings::completed(
            topic_index,
            topic.clone(),
            "No search results were gathered before the search budget ran out.",
            Vec::new(),
        );
    }

    let summary = hits
        .iter()
        .map(|hit| format!("- [{}]({}): {}", hit.title, hit.url, hit.snippet.trim()))
        .collect::<Vec<_>>()
        .join("\n");
    let sources = normalize_sources(
        hits.iter()
            .filter_map(|hit| Source::parse(&hit.title, &hit.url).ok()),
    );
    TopicFindings::completed(topic_index, topic.clone(), summary, sources)
}

async fn with_timeout<T, F>(work: F, timeout: Option<Duration>) -> anyhow::Result<T>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, work)
            .await
            .map_err(|_| anyhow!("timed out after {:?}", limit))?,
        None => work.await,
    }
}

/// Research every topic, resuming per-topic slots from the checkpoint where present
pub async fn research_topics(
    runner: &StageRunner,
    researcher: &Researcher<'_>,
    topics: &TopicSet,
    settings: FanOutSettings,
) -> Result<ResearchBatch, StageFailure> {
    let timeout = settings.task_timeout;

    let results = execute_batch(
        Stage::Research,
        topics.iter().collect::<Vec<_>>(),
        settings.max_concurrency,
        move |topic, ctx| async move {
            let key = StageKey::Findings(ctx.index);
            let id = task_id(ctx.index);

            if runner.is_checkpointed(key) {
                log_task_skipped!(&id, "findings loaded from checkpoint");
                return runner
                    .load::<TopicFindings>(key)
                    .await
                    .map_err(anyhow::Error::from);
            }

            let work = async {
                let (findings, _) = runner
                    .run(
                        key,
                        || with_timeout(researcher.research(ctx.index, topic), timeout),
                        gates::findings,
                    )
                    .await?;
                Ok::<_, anyhow::Error>(findings)
            };
            execute_task(ctx, &id, topic.text(), work, |findings: &TopicFindings| {
                format!(
                    "{} ({} sources)",
                    findings.outcome.label(),
                    findings.sources.len()
                )
            })
            .await
        },
    )
    .await;

    let findings = results
        .into_iter()
        .zip(topics.iter())
        .enumerate()
        .map(|(index, (result, topic))| match result {
            Ok(findings) => findings,
            Err(e) => {
                let reason = StageFailure::reason_of(&e);
                tracing::warn!(topic_index = index, %reason, "research task failed");
                TopicFindings::failed(index, topic.clone(), reason)
            }
        })
        .collect();

    let batch = ResearchBatch::new(findings);
    if !batch.is_usable() {
        return Err(StageFailure::Batch {
            failures: batch.failures(),
        });
    }

    let failed = batch.failures().len();
    if failed > 0 {
        tracing::warn!(
            failed,
            total = batch.len(),
            "continuing with partial research results"
        );
    }
    Ok(batch)
}
