//! Phase 1: Topic planning
//!
//! Splits the brief into independent subtopics for the fan-out. Accepts the documented
//! `{topics: [{topic}], reasoning}` shape as well as a bare list of strings or objects.

use anyhow::{bail, Context};
use deep_research_sdk::{ContentGenerator, GenerationRequest, Stage};
use serde::Deserialize;

use crate::research::prompts;
use crate::research::types::{Brief, Topic, TopicSet};
use crate::workflow_utils::parse_structured;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TopicDraft {
    Object { topic: String },
    Text(String),
}

impl TopicDraft {
    fn into_text(self) -> String {
        match self {
            TopicDraft::Object { topic } | TopicDraft::Text(topic) => topic,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PlanDraft {
    Plan {
        topics: Vec<TopicDraft>,
        #[serde(default)]
        reasoning: Option<String>,
    },
    List(Vec<TopicDraft>),
}

/// Parse a planning response, keeping at most `max_topics` non-blank topics in order
pub fn parse_topics(response: &str, max_topics: usize) -> anyhow::Result<TopicSet> {
    let draft: PlanDraft = parse_structured(response).context("topic plan is not a topic list")?;

    let drafts = match draft {
        PlanDraft::Plan { topics, reasoning } => {
            if let Some(reasoning) = reasoning {
                tracing::debug!(%reasoning, "topic plan reasoning");
            }
            topics
        }
        PlanDraft::List(topics) => topics,
    };

    let planned = drafts.len();
    let topics: Vec<Topic> = drafts
        .into_iter()
        .map(|d| d.into_text().trim().to_string())
        .filter(|t| !t.is_empty())
        .take(max_topics)
        .map(Topic::new)
        .collect();

    if planned > max_topics {
        tracing::info!(planned, kept = max_topics, "truncating topic plan");
    }

    Ok(TopicSet::new(topics))
}

pub async fn plan_topics(
    generator: &dyn ContentGenerator,
    brief: &Brief,
    max_topics: usize,
) -> anyhow::Result<TopicSet> {
    if max_topics == 0 {
        bail!("max_topics must be at least 1");
    }
    let request = GenerationRequest::new(Stage::Topics, prompts::plan_prompt(brief, max_topics));
    let response = generator
        .generate(&request)
        .await
        .context("topic planning failed")?;
    parse_topics(&response, max_topics)
}
