//! OpenAI-compatible chat completions as a [`ContentGenerator`]

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use deep_research_sdk::{ContentGenerator, GenerationRequest, Stage};

use super::ProviderConfig;

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Role description sent as the system message for each stage
pub fn system_prompt(stage: Stage) -> &'static str {
    match stage {
        Stage::Brief => "You turn research requests into precise research briefs.",
        Stage::Topics => "You are a research supervisor who splits a brief into independent research topics.",
        Stage::Research => "You are a meticulous web researcher. You answer with exactly one YAML step per turn.",
        Stage::Compress => "You organize raw research findings without losing detail or citations.",
        Stage::Report => "You write comprehensive, well-cited research reports in markdown.",
    }
}

pub struct OpenAiGenerator {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl OpenAiGenerator {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        Ok(Self {
            client: config.http_client()?,
            endpoint: format!("{}/chat/completions", config.base_url),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

fn first_content(response: ChatResponse) -> Result<String> {
    let content = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("response contained no choices"))?
        .message
        .content
        .unwrap_or_default();
    if content.trim().is_empty() {
        bail!("response content was empty");
    }
    Ok(content)
}

#[async_trait]
impl ContentGenerator for OpenAiGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt(request.stage),
                },
                ChatMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
            temperature: 0.2,
        };

        tracing::debug!(stage = %request.stage, topic_index = ?request.topic_index, model = %self.model, "sending chat completion");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("request to {} failed", self.endpoint))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let preview: String = text.chars().take(300).collect();
            bail!("chat completion returned {}: {}", status, preview);
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .context("chat completion response is not valid JSON")?;
        first_content(parsed)
    }
}
