//! Query embedding clients.

use async_trait::async_trait;

use crate::embeddings::Embedding;
use crate::error::EmbeddingError;

pub mod ollama;
pub mod openai;

pub use ollama::OllamaEmbedder;
pub use openai::OpenAiEmbedder;

/// Converts text into a dense vector via a remote embedding service.
///
/// One outbound call per invocation: no retries, no caching. Callers reject blank input before
/// calling.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embeds `text`.
    async fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError>;
}

/// Joins a base URL and a path without doubling slashes.
pub(crate) fn join_endpoint(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Reads a non-success body for diagnostics.
pub(crate) async fn body_text(resp: reqwest::Response) -> String {
    resp.text()
        .await
        .unwrap_or_else(|_| "<body unavailable>".to_string())
}
