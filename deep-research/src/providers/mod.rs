//! HTTP collaborators used by the `deep-research` binary
//!
//! The pipeline only sees the [`ContentGenerator`](deep_research_sdk::ContentGenerator) and
//! [`SearchProvider`](deep_research_sdk::SearchProvider) traits; these are the concrete
//! implementations, configured from the environment.

pub mod openai;
pub mod searx;

pub use openai::OpenAiGenerator;
pub use searx::SearxSearch;

use anyhow::{Context, Result};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub searx_url: String,
    pub request_timeout: Duration,
}

impl ProviderConfig {
    /// Read `OPENAI_API_KEY`, `OPENAI_BASE_URL`, `DEEP_RESEARCH_MODEL` and `SEARX_URL`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let api_key = non_empty("OPENAI_API_KEY").context("OPENAI_API_KEY is not set")?;
        let searx_url = non_empty("SEARX_URL").context("SEARX_URL is not set")?;

        Ok(Self {
            api_key,
            base_url: non_empty("OPENAI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            model: non_empty("DEEP_RESEARCH_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            searx_url: searx_url.trim_end_matches('/').to_string(),
            request_timeout: REQUEST_TIMEOUT,
        })
    }

    pub fn http_client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(self.request_timeout)
            .user_agent(concat!("deep-research/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")
    }
}
