//! Ollama embedding client.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use super::{body_text, join_endpoint, Embedder};
use crate::embeddings::Embedding;
use crate::error::EmbeddingError;

/// Embeddings client for a local or remote Ollama daemon (`/api/embeddings`).
#[derive(Clone)]
pub struct OllamaEmbedder {
    client: Client,
    endpoint: String,
    model: String,
}

impl OllamaEmbedder {
    /// Builds a new Ollama embeddings client.
    ///
    /// # Arguments
    /// * `base_url` - Daemon root, e.g. `http://127.0.0.1:11434`
    /// * `model` - Embedding model tag, e.g. `nomic-embed-text`
    pub fn new(base_url: &str, model: String, timeout: Duration) -> Result<Self> {
        Url::parse(base_url).with_context(|| format!("invalid Ollama URL {base_url}"))?;
        anyhow::ensure!(!model.trim().is_empty(), "missing Ollama embedding model");
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build Ollama HTTP client")?;
        Ok(Self {
            client,
            endpoint: join_endpoint(base_url, "api/embeddings"),
            model,
        })
    }

    /// Model tag sent with every request.
    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        let request = EmbeddingRequest {
            model: &self.model,
            prompt: text,
        };
        let resp = self.client.post(&self.endpoint).json(&request).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = body_text(resp).await;
            return Err(EmbeddingError::Status { status, body });
        }
        let raw = resp.text().await?;
        parse_embedding(&raw)
    }
}

fn parse_embedding(raw: &str) -> Result<Embedding, EmbeddingError> {
    let parsed: EmbeddingResponse = serde_json::from_str(raw)
        .map_err(|err| EmbeddingError::MalformedResponse(err.to_string()))?;
    match parsed.embedding {
        Some(values) if !values.is_empty() => Ok(values),
        Some(_) => Err(EmbeddingError::MalformedResponse(
            "embedding array is empty".to_string(),
        )),
        None => Err(EmbeddingError::MalformedResponse(
            "response has no `embedding` field".to_string(),
        )),
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    embedding: Option<Vec<f32>>,
}
