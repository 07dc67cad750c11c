//! SearxNG JSON search as a [`SearchProvider`]

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde::Deserialize;

use deep_research_sdk::{SearchHit, SearchProvider};

use super::ProviderConfig;

#[derive(Debug, Deserialize)]
struct SearxResponse {
    #[serde(default)]
    results: Vec<SearxResult>,
}

#[derive(Debug, Deserialize)]
struct SearxResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
}

impl SearxResponse {
    fn into_hits(self) -> Vec<SearchHit> {
        self.results
            .into_iter()
            .filter(|r| !r.url.trim().is_empty())
            .map(|r| SearchHit {
                title: r.title,
                url: r.url,
                snippet: r.content,
            })
            .collect()
    }
}

pub struct SearxSearch {
    client: reqwest::Client,
    endpoint: String,
}

impl SearxSearch {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        Ok(Self {
            client: config.http_client()?,
            endpoint: format!("{}/search", config.searx_url),
        })
    }
}

#[async_trait]
impl SearchProvider for SearxSearch {
    async fn search(&self, query: &str) -> Result<BoxStream<'static, SearchHit>> {
        tracing::debug!(%query, endpoint = %self.endpoint, "searching");

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("q", query), ("format", "json")])
            .send()
            .await
            .with_context(|| format!("search request to {} failed", self.endpoint))?;

        let status = response.status();
        if !status.is_success() {
            bail!("search returned {}", status);
        }

        let parsed: SearxResponse = response
            .json()
            .await
            .context("search response is not valid JSON")?;
        Ok(stream::iter(parsed.into_hits()).boxed())
    }
}
