use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::throttle::Throttle;

pub const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/customsearch/v1";
/// Custom Search caps `num` at 10 per request.
const MAX_PAGE_SIZE: usize = 10;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("search API error (status {status}): {message}")]
    Api { status: u16, message: String },
}

#[async_trait]
pub trait SearchEngine: Send + Sync {
    /// Result URLs in ranking order, at most `max_results` of them.
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<String>, SearchError>;
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    link: String,
}

/// Google Programmable Search (Custom Search JSON API).
pub struct GoogleSearch {
    client: Client,
    api_key: String,
    engine_id: String,
    endpoint: String,
    throttle: Throttle,
}

impl GoogleSearch {
    pub fn new(
        api_key: String,
        engine_id: String,
        endpoint: String,
        timeout: Duration,
        min_interval: Duration,
    ) -> anyhow::Result<Self> {
        anyhow::ensure!(!api_key.trim().is_empty(), "missing search API key");
        anyhow::ensure!(!engine_id.trim().is_empty(), "missing search engine id");
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build search HTTP client")?;
        Ok(Self {
            client,
            api_key,
            engine_id,
            endpoint,
            throttle: Throttle::new(min_interval),
        })
    }
}

#[async_trait]
impl SearchEngine for GoogleSearch {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<String>, SearchError> {
        let num = max_results.clamp(1, MAX_PAGE_SIZE).to_string();
        self.throttle.wait().await;
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("key", self.api_key.as_str()),
                ("cx", self.engine_id.as_str()),
                ("q", query),
                ("num", num.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SearchError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: SearchResponse = response.json().await?;
        debug!("Search {:?} returned {} results", query, parsed.items.len());
        Ok(links(parsed, max_results))
    }
}

fn links(response: SearchResponse, max_results: usize) -> Vec<String> {
    response
        .items
        .into_iter()
        .map(|item| item.link)
        .take(max_results)
        .collect()
}
