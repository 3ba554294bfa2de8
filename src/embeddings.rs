//! Shared embedding data structures used across pipeline stages.

use serde::{Deserialize, Serialize};

/// Dense vector produced by an embedding model.
pub type Embedding = Vec<f32>;

/// Stored unit of retrievable text. Read-only at query time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    /// Opaque identifier assigned by the ingestion pipeline.
    pub id: String,
    /// Non-empty fragment body.
    pub text: String,
    /// Stored vector. Empty when an indexed backend does not expose it.
    #[serde(default)]
    pub vector: Embedding,
}

impl Fragment {
    /// Builds a fragment from its parts.
    pub fn new(id: impl Into<String>, text: impl Into<String>, vector: Embedding) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            vector,
        }
    }
}

/// Fragment paired with its similarity to the current query.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredFragment {
    /// Candidate fragment.
    pub fragment: Fragment,
    /// Cosine similarity to the query vector.
    pub score: f32,
}

/// One line of a JSONL fragment dump, as written by the ingestion job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddedFragmentRecord {
    /// Row identifier.
    pub id: String,
    /// Fragment body.
    pub content: String,
    /// Model embedding vector.
    pub embedding: Vec<f32>,
}

impl From<EmbeddedFragmentRecord> for Fragment {
    fn from(record: EmbeddedFragmentRecord) -> Self {
        Self {
            id: record.id,
            text: record.content,
            vector: record.embedding,
        }
    }
}
