//! Ollama `/api/generate` streaming client.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use url::Url;

use super::{body_stream, Generator, RawStream, WireFormat};
use crate::embedder::{body_text, join_endpoint};
use crate::error::GenerationError;

/// Completion client for an Ollama daemon with token streaming enabled.
#[derive(Clone)]
pub struct OllamaGenerator {
    client: Client,
    endpoint: String,
    model: String,
}

impl OllamaGenerator {
    /// Builds a new generator.
    ///
    /// `timeout` bounds the whole exchange including the stream; `None` leaves only the
    /// connect timeout in place.
    pub fn new(
        base_url: &str,
        model: String,
        connect_timeout: Duration,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        Url::parse(base_url).with_context(|| format!("invalid Ollama URL {base_url}"))?;
        anyhow::ensure!(!model.trim().is_empty(), "missing Ollama generation model");
        let mut builder = Client::builder().connect_timeout(connect_timeout);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .context("failed to build Ollama HTTP client")?;
        Ok(Self {
            client,
            endpoint: join_endpoint(base_url, "api/generate"),
            model,
        })
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    async fn start(&self, prompt: &str) -> Result<RawStream, GenerationError> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: true,
        };
        let resp = self.client.post(&self.endpoint).json(&request).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = body_text(resp).await;
            return Err(GenerationError::Status { status, body });
        }
        Ok(body_stream(resp))
    }

    fn wire_format(&self) -> WireFormat {
        WireFormat::OllamaNdjson
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}
