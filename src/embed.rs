//! Text embeddings for field classification.

use std::time::Duration;

use anyhow::{anyhow, ensure, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "text-embedding-3-small";

#[async_trait]
pub trait Embedder: Send + Sync {
    /// One vector per input, in input order.
    async fn embed_batch(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>>;

    /// Largest batch accepted by [`Embedder::embed_batch`].
    fn batch_size(&self) -> usize {
        64
    }
}

/// `/embeddings` client for OpenAI-compatible APIs. Transient failures
/// (429, 5xx, connect and timeout errors) are retried with 1s, 2s, 4s... delays.
pub struct OpenAiEmbedder {
    client: Client,
    api_key: String,
    endpoint: String,
    model: String,
    attempts: u32,
    batch_size: usize,
}

impl OpenAiEmbedder {
    pub fn new(
        api_key: String,
        base_url: &str,
        model: String,
        timeout: Duration,
        max_retries: usize,
        batch_size: usize,
    ) -> Result<Self> {
        ensure!(!api_key.trim().is_empty(), "missing embeddings API key");
        ensure!(!model.trim().is_empty(), "missing embeddings model name");
        ensure!(batch_size > 0, "embedding batch size must be positive");
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build embeddings HTTP client")?;
        Ok(Self {
            client,
            api_key: api_key.trim().to_string(),
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            model,
            attempts: u32::try_from(max_retries.max(1)).unwrap_or(u32::MAX),
            batch_size,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed_batch(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        ensure!(
            inputs.len() <= self.batch_size,
            "{} inputs exceed the embedding batch size {}",
            inputs.len(),
            self.batch_size
        );

        let body = EmbeddingRequest {
            model: &self.model,
            input: inputs,
        };
        let mut last_error = None;

        for attempt in 0..self.attempts {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                warn!("Embedding attempt {} failed, retrying in {}s", attempt, delay.as_secs());
                tokio::time::sleep(delay).await;
            }

            let response = match self
                .client
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) if e.is_timeout() || e.is_connect() => {
                    last_error = Some(anyhow!(e));
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let status = response.status();
            if status.is_success() {
                let parsed: EmbeddingResponse = response
                    .json()
                    .await
                    .context("malformed embeddings response")?;
                return into_vectors(parsed, inputs.len());
            }

            let text = response.text().await.unwrap_or_default();
            let error = anyhow!("embeddings API returned {}: {}", status, text);
            if !should_retry(status) {
                return Err(error);
            }
            last_error = Some(error);
        }

        Err(last_error.unwrap_or_else(|| anyhow!("embedding request was never sent")))
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Vectors in input order. The API tags each vector with its input index.
fn into_vectors(mut parsed: EmbeddingResponse, expected: usize) -> Result<Vec<Vec<f32>>> {
    ensure!(
        parsed.data.len() == expected,
        "got {} embeddings for {} inputs",
        parsed.data.len(),
        expected
    );
    parsed.data.sort_by_key(|d| d.index);
    Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

/// Cosine similarity of two equal-length vectors; zero when either is all zeros.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_of_parallel_and_orthogonal_vectors() {
        assert!((cosine_similarity(&[1.0, 2.0], &[2.0, 4.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 3.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_with_zero_vector_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn vectors_are_reordered_by_index() {
        let json = r#"{"data": [
            {"object": "embedding", "index": 1, "embedding": [0.0, 1.0]},
            {"object": "embedding", "index": 0, "embedding": [1.0, 0.0]}
        ]}"#;
        let parsed: EmbeddingResponse = serde_json::from_str(json).unwrap();
        let vectors = into_vectors(parsed, 2).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn count_mismatch_is_an_error() {
        let json = r#"{"data": [{"index": 0, "embedding": [1.0]}]}"#;
        let parsed: EmbeddingResponse = serde_json::from_str(json).unwrap();
        assert!(into_vectors(parsed, 2).is_err());
    }

    #[test]
    fn only_transient_statuses_are_retried() {
        assert!(should_retry(StatusCode::TOO_MANY_REQUESTS));
        assert!(should_retry(StatusCode::BAD_GATEWAY));
        assert!(!should_retry(StatusCode::UNAUTHORIZED));
        assert!(!should_retry(StatusCode::BAD_REQUEST));
    }

    #[tokio::test]
    async fn empty_batch_skips_the_request() {
        let embedder = OpenAiEmbedder::new(
            "sk-test".into(),
            "http://127.0.0.1:9",
            DEFAULT_MODEL.into(),
            Duration::from_secs(1),
            1,
            4,
        )
        .unwrap();
        assert!(embedder.embed_batch(&[]).await.unwrap().is_empty());
        assert!(embedder.embed_batch(&["a"; 5]).await.is_err());
    }

    #[test]
    fn constructor_validates_inputs() {
        let build = |key: &str, model: &str, batch: usize| {
            OpenAiEmbedder::new(
                key.into(),
                DEFAULT_BASE_URL,
                model.into(),
                Duration::from_secs(5),
                3,
                batch,
            )
        };
        assert!(build("", DEFAULT_MODEL, 8).is_err());
        assert!(build("sk-test", "", 8).is_err());
        assert!(build("sk-test", DEFAULT_MODEL, 0).is_err());
        assert!(build("sk-test", DEFAULT_MODEL, 8).is_ok());
    }
}
