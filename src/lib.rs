#![warn(missing_docs)]
//! Retrieval-augmented chat: embed the latest question, retrieve grounding fragments, and stream
//! a filtered model answer back to the client.

pub mod config;
pub mod conversation;
pub mod embedder;
pub mod embeddings;
pub mod error;
pub mod generator;
pub mod logging;
pub mod pipeline;
pub mod prompt;
pub mod reframe;
pub mod server;
pub mod similarity;
pub mod vector_store;

pub use config::PipelineArgs;
pub use conversation::{ConversationTurn, Role};
pub use embeddings::{EmbeddedFragmentRecord, Embedding, Fragment, ScoredFragment};
pub use error::{
    DimensionMismatch, EmbeddingError, GenerationError, MalformedRecord, PipelineError,
    RetrievalError,
};
pub use pipeline::{PreparedPrompt, QueryPipeline};
pub use reframe::{reframe, EventStream, ReframedEvent, StreamEvent};
pub use vector_store::TableName;
