//! Embedding client for OpenAI-compatible `/embeddings` endpoints.
//!
//! Inputs are sent in batches of at most `batch_size` texts. Each batch is
//! retried on HTTP 429, 5xx and transient transport errors with exponential
//! backoff; once a batch exhausts its retries the whole `embed` call fails and
//! nothing from earlier batches is returned.

use crate::config::EmbeddingConfig;
use crate::error::EmbeddingError;
use crate::traits::Embedder;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

pub struct OpenAiEmbedder {
    client: Client,
    endpoint: Url,
    model: String,
    batch_size: usize,
    max_retries: u32,
}

impl OpenAiEmbedder {
    pub fn new(
        api_key: &str,
        base_url: &str,
        model: impl Into<String>,
        timeout: Duration,
        batch_size: usize,
        max_retries: u32,
    ) -> Result<Self, EmbeddingError> {
        let model = model.into();
        if model.trim().is_empty() {
            return Err(EmbeddingError::InvalidConfig(
                "embedding model name is empty".to_string(),
            ));
        }
        if batch_size == 0 {
            return Err(EmbeddingError::InvalidConfig(
                "embedding batch size must be positive".to_string(),
            ));
        }

        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {}", api_key.trim())).map_err(|_| {
            EmbeddingError::InvalidConfig("api key is not a valid header value".to_string())
        })?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            endpoint: embeddings_endpoint(base_url)?,
            model,
            batch_size,
            max_retries,
        })
    }

    /// Builds the client from config, reading the API key from the
    /// environment variable the config names.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| EmbeddingError::MissingApiKey(config.api_key_env.clone()))?;
        Self::with_api_key(config, &api_key)
    }

    pub fn with_api_key(config: &EmbeddingConfig, api_key: &str) -> Result<Self, EmbeddingError> {
        Self::new(
            api_key,
            &config.base_url,
            config.model.clone(),
            Duration::from_secs(config.timeout_secs),
            config.batch_size,
            config.max_retries,
        )
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: inputs,
        };

        let mut attempt = 0u32;
        loop {
            let outcome = self
                .client
                .post(self.endpoint.clone())
                .json(&request)
                .send()
                .await;

            match outcome {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let parsed: EmbeddingResponse = response.json().await?;
                        return into_ordered_vectors(parsed, inputs.len());
                    }

                    let body = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "<body unavailable>".to_string());
                    if should_retry(status) && attempt < self.max_retries {
                        attempt += 1;
                        warn!(%status, attempt, "embedding request rejected, retrying");
                        tokio::time::sleep(retry_backoff(attempt)).await;
                        continue;
                    }
                    return Err(EmbeddingError::Provider {
                        status: status.as_u16(),
                        body,
                    });
                }
                Err(error) => {
                    if is_transient(&error) && attempt < self.max_retries {
                        attempt += 1;
                        warn!(%error, attempt, "embedding request failed, retrying");
                        tokio::time::sleep(retry_backoff(attempt)).await;
                        continue;
                    }
                    return Err(error.into());
                }
            }
        }
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for (index, batch) in texts.chunks(self.batch_size).enumerate() {
            debug!(batch = index, size = batch.len(), model = %self.model, "embedding batch");
            vectors.extend(self.embed_batch(batch).await?);
        }
        Ok(vectors)
    }
}

pub(crate) fn embeddings_endpoint(base_url: &str) -> Result<Url, EmbeddingError> {
    let base = Url::parse(&format!("{}/", base_url.trim_end_matches('/')))?;
    Ok(base.join("embeddings")?)
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn is_transient(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect()
}

fn retry_backoff(attempt: u32) -> Duration {
    Duration::from_millis(500u64 * (1u64 << attempt.min(5)))
}

fn into_ordered_vectors(
    mut response: EmbeddingResponse,
    expected: usize,
) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    if response.data.len() != expected {
        return Err(EmbeddingError::CountMismatch {
            expected,
            actual: response.data.len(),
        });
    }
    response.data.sort_by_key(|entry| entry.index);
    Ok(response
        .data
        .into_iter()
        .map(|entry| entry.embedding)
        .collect())
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}
