//! Streaming completion backends.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;

use crate::error::GenerationError;

pub mod ollama;
pub mod openai;

pub use ollama::OllamaGenerator;
pub use openai::OpenAiGenerator;

/// Raw body chunks of one completion stream. Finite and not restartable.
pub type RawStream = BoxStream<'static, Result<Bytes, GenerationError>>;

/// Record framing used by a backend's streaming body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    /// Newline-delimited JSON objects carrying a `response` increment.
    OllamaNdjson,
    /// `data: {...}` lines carrying `choices[0].delta.content`, ended by `data: [DONE]`.
    OpenAiSse,
}

/// Opens a streaming completion for a prompt.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Starts generation. A non-success status fails here, before any chunk is produced.
    async fn start(&self, prompt: &str) -> Result<RawStream, GenerationError>;

    /// Framing of the chunks returned by [`Generator::start`].
    fn wire_format(&self) -> WireFormat;
}

/// Adapts a `reqwest` response body into a [`RawStream`].
///
/// Dropping the returned stream drops the body and releases the connection.
pub(crate) fn body_stream(resp: reqwest::Response) -> RawStream {
    resp.bytes_stream()
        .map(|chunk| chunk.map_err(GenerationError::from))
        .boxed()
}
