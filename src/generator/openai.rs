//! OpenAI-compatible chat completions with `stream: true`.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::Serialize;

use super::{body_stream, Generator, RawStream, WireFormat};
use crate::embedder::{body_text, join_endpoint};
use crate::error::GenerationError;

/// Streams chat completions, sending the assembled prompt as a single user message.
#[derive(Clone)]
pub struct OpenAiGenerator {
    client: Client,
    endpoint: String,
    model: String,
}

impl OpenAiGenerator {
    /// Builds a new generator.
    pub fn new(
        api_key: &str,
        base_url: &str,
        model: String,
        connect_timeout: Duration,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        anyhow::ensure!(!api_key.trim().is_empty(), "missing OpenAI API key");
        anyhow::ensure!(!model.trim().is_empty(), "missing OpenAI chat model");
        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth).context("invalid OpenAI API key")?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let mut builder = Client::builder()
            .connect_timeout(connect_timeout)
            .default_headers(headers);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .context("failed to build OpenAI HTTP client")?;
        Ok(Self {
            client,
            endpoint: join_endpoint(base_url, "chat/completions"),
            model,
        })
    }
}

#[async_trait]
impl Generator for OpenAiGenerator {
    async fn start(&self, prompt: &str) -> Result<RawStream, GenerationError> {
        let body = ChatRequest {
            model: &self.model,
            stream: true,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };
        let resp = self.client.post(&self.endpoint).json(&body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = body_text(resp).await;
            return Err(GenerationError::Status { status, body });
        }
        Ok(body_stream(resp))
    }

    fn wire_format(&self) -> WireFormat {
        WireFormat::OpenAiSse
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    stream: bool,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}
