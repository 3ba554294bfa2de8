//! Error taxonomy for the query pipeline.
//!
//! Every fatal kind aborts the current request only. `MalformedRecord` is the one non-fatal kind:
//! the reframer logs it and moves on to the next record.

use reqwest::StatusCode;
use thiserror::Error;

/// Failures while turning text into an embedding.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// The embedding service could not be reached or the body could not be read.
    #[error("embedding service unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    /// The embedding service answered with a non-success status.
    #[error("embedding service returned {status}: {body}")]
    Status {
        /// HTTP status returned by the service.
        status: StatusCode,
        /// Response body, kept for diagnostics.
        body: String,
    },
    /// The response did not carry a usable numeric array.
    #[error("malformed embedding response: {0}")]
    MalformedResponse(String),
}

/// Similarity was requested for vectors of different lengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("vector dimensions differ ({left} vs {right})")]
pub struct DimensionMismatch {
    /// Length of the left-hand vector.
    pub left: usize,
    /// Length of the right-hand vector.
    pub right: usize,
}

/// Failures while fetching fragments from a vector store.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// HTTP transport failure talking to an indexed store.
    #[error("vector store unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    /// The indexed store answered with a non-success status or an error payload.
    #[error("vector store rejected the query ({status}): {message}")]
    Status {
        /// HTTP status returned by the store.
        status: StatusCode,
        /// Error text reported by the store.
        message: String,
    },
    /// Postgres query failure.
    #[error("database query failed: {0}")]
    Database(#[from] tokio_postgres::Error),
    /// A flat fragment source could not be read.
    #[error("fragment source unreadable: {0}")]
    Io(#[from] std::io::Error),
    /// A flat fragment source held a row that could not be decoded.
    #[error("invalid fragment at line {line}: {message}")]
    InvalidFragment {
        /// One-based line number in the source.
        line: usize,
        /// Decoder message.
        message: String,
    },
    /// A stored vector does not match the query dimension.
    #[error("stored fragment {id} has mismatched dimension: {source}")]
    DimensionMismatch {
        /// Identifier of the offending fragment.
        id: String,
        /// Underlying mismatch.
        source: DimensionMismatch,
    },
}

/// Failures while opening or draining the completion stream.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// Connection, timeout or body read failure.
    #[error("completion backend unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    /// The completion backend rejected the request before streaming began.
    #[error("completion backend returned {status}: {body}")]
    Status {
        /// HTTP status returned by the backend.
        status: StatusCode,
        /// Response body, kept for diagnostics.
        body: String,
    },
    /// The backend reported an error inside the stream.
    #[error("completion backend failed mid-stream: {0}")]
    Backend(String),
}

/// A raw stream record that could not be decoded. Skipped, never fatal.
#[derive(Debug, Error)]
#[error("malformed stream record: {0}")]
pub struct MalformedRecord(pub String);

/// Pre-stream failure of one pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The latest user message was missing or blank.
    #[error("latest message is empty")]
    EmptyQuestion,
    /// Embedding the question failed.
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
    /// Retrieving fragments failed.
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),
    /// Opening the completion stream failed.
    #[error(transparent)]
    Generation(#[from] GenerationError),
}
