//! One request through embed, retrieve, assemble, generate and reframe.

use std::sync::Arc;

use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use crate::conversation::ConversationTurn;
use crate::embedder::Embedder;
use crate::embeddings::Fragment;
use crate::error::PipelineError;
use crate::generator::Generator;
use crate::prompt;
use crate::reframe::{reframe, EventStream};
use crate::vector_store::VectorStore;

/// Prompt ready for generation, with the fragments it was grounded on.
#[derive(Debug, Clone)]
pub struct PreparedPrompt {
    /// Latest user message.
    pub question: String,
    /// Retrieved fragments in rank order.
    pub fragments: Vec<Fragment>,
    /// Fully assembled prompt text.
    pub prompt: String,
}

/// Orchestrates the query components. Built once at startup and shared across requests.
#[derive(Clone)]
pub struct QueryPipeline {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    generator: Arc<dyn Generator>,
    top_k: usize,
}

impl QueryPipeline {
    /// Wires the pipeline from already constructed components.
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        generator: Arc<dyn Generator>,
        top_k: usize,
    ) -> Self {
        Self {
            embedder,
            store,
            generator,
            top_k,
        }
    }

    /// Number of fragments requested per query.
    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Name of the configured vector store.
    pub fn store_name(&self) -> &'static str {
        self.store.name()
    }

    /// Embeds the latest message, retrieves context and assembles the prompt.
    pub async fn prepare(&self, turns: &[ConversationTurn]) -> Result<PreparedPrompt, PipelineError> {
        let question = turns
            .last()
            .map(|turn| turn.content.trim())
            .filter(|content| !content.is_empty())
            .ok_or(PipelineError::EmptyQuestion)?
            .to_string();

        let query = self.embedder.embed(&question).await?;
        let fragments = self.store.search(&query, self.top_k).await?;
        info!(
            store = self.store.name(),
            requested = self.top_k,
            retrieved = fragments.len(),
            "retrieved context"
        );
        let prompt = prompt::assemble(&fragments, turns, &question);
        Ok(PreparedPrompt {
            question,
            fragments,
            prompt,
        })
    }

    /// Runs the full pipeline and returns the client event stream.
    ///
    /// Every failure before the first byte of generation surfaces here. Failures after that
    /// only shorten the returned stream.
    pub async fn run(&self, turns: &[ConversationTurn]) -> Result<EventStream, PipelineError> {
        let session_id = Uuid::new_v4().to_string();
        let span = info_span!("chat", session = %session_id);
        async {
            let prepared = self.prepare(turns).await?;
            let raw = self.generator.start(&prepared.prompt).await?;
            info!(format = ?self.generator.wire_format(), "completion stream opened");
            Ok(reframe(raw, self.generator.wire_format(), session_id.clone()))
        }
        .instrument(span)
        .await
    }
}
