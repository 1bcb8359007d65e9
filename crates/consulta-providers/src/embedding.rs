//! Ollama-compatible embedding backend.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use consulta_core::defaults::{
    DEFAULT_EMBED_BASE_URL, EMBED_DIMENSION, EMBED_MODEL, EMBED_TIMEOUT_SECS, ENV_EMBED_BASE_URL,
    ENV_EMBED_DIM, ENV_EMBED_MODEL,
};
use consulta_core::{EmbeddingBackend, Error, Result};

/// Embedding backend speaking the Ollama `/api/embeddings` protocol.
pub struct HttpEmbeddingBackend {
    base_url: String,
    model: String,
    dimension: usize,
    client: Client,
    timeout: Duration,
}

impl HttpEmbeddingBackend {
    pub fn new(base_url: String, model: String, dimension: usize) -> Self {
        Self {
            base_url,
            model,
            dimension,
            client: Client::new(),
            timeout: Duration::from_secs(EMBED_TIMEOUT_SECS),
        }
    }

    /// Create from environment variables with defaults.
    pub fn from_env() -> Self {
        let base_url = std::env::var(ENV_EMBED_BASE_URL)
            .unwrap_or_else(|_| DEFAULT_EMBED_BASE_URL.to_string());
        let model = std::env::var(ENV_EMBED_MODEL).unwrap_or_else(|_| EMBED_MODEL.to_string());
        let dimension = std::env::var(ENV_EMBED_DIM)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(EMBED_DIMENSION);
        info!(base_url = %base_url, model = %model, dimension, "Initializing embedding backend");
        Self::new(base_url, model, dimension)
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingBackend for HttpEmbeddingBackend {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.base_url);

        debug!(text_len = text.len(), model = %self.model, "Embedding text");

        let response = self
            .client
            .post(&url)
            .json(&EmbeddingRequest {
                model: &self.model,
                prompt: text,
            })
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout(format!("Embedding call exceeded {:?}", self.timeout))
                } else {
                    Error::ProviderUnavailable(format!("Embedding request failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::ProviderUnavailable(format!(
                "Embedder returned {}: {}",
                status, body
            )));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| Error::ProviderUnavailable(format!("Bad embedding body: {}", e)))?;

        if parsed.embedding.len() != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                actual: parsed.embedding.len(),
            });
        }

        Ok(parsed.embedding)
    }

    async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/api/tags", self.base_url);
        match self
            .client
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(resp) => Ok(resp.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
