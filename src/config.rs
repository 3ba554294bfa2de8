//! Command-line and environment settings shared by the binaries.
//!
//! [`PipelineArgs::build_pipeline`] is the only place that looks at which backends were chosen.
//! Everything downstream sees trait objects.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};

use crate::embedder::{Embedder, OllamaEmbedder, OpenAiEmbedder};
use crate::generator::{Generator, OllamaGenerator, OpenAiGenerator};
use crate::pipeline::QueryPipeline;
use crate::vector_store::postgres::connect;
use crate::vector_store::{
    AstraStore, BruteForceStore, JsonlFragments, PgVectorStore, PostgresFragments, TableName,
    VectorStore,
};

/// Vector store backend.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum VectorDb {
    /// DataStax Astra Data API collection (indexed).
    Astra,
    /// Postgres table with a pgvector column (indexed).
    Pgvector,
    /// Postgres table with a `float8[]` column, ranked in-process.
    Postgres,
    /// JSONL dump of embedded fragments, ranked in-process.
    Jsonl,
}

/// Remote model provider.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum Provider {
    /// Local or remote Ollama daemon.
    Ollama,
    /// OpenAI-compatible HTTP API.
    Openai,
}

/// Settings needed to build a [`QueryPipeline`].
#[derive(Args, Debug, Clone)]
pub struct PipelineArgs {
    /// Vector store backend
    #[arg(long, env = "RAGSTREAM_VECTOR_DB", value_enum, default_value = "postgres")]
    pub vector_db: VectorDb,

    /// Fragments retrieved per question
    #[arg(long, env = "RAGSTREAM_TOP_K", default_value_t = 10)]
    pub top_k: usize,

    /// Base URL of the Ollama daemon
    #[arg(long, env = "OLLAMA_API_URL", default_value = "http://127.0.0.1:11434")]
    pub ollama_url: String,

    /// Provider used to embed questions
    #[arg(long, env = "RAGSTREAM_EMBEDDING_PROVIDER", value_enum, default_value = "ollama")]
    pub embedding_provider: Provider,

    /// Embedding model identifier
    #[arg(long, env = "RAGSTREAM_EMBEDDING_MODEL", default_value = "nomic-embed-text")]
    pub embedding_model: String,

    /// Embedding dimension override (OpenAI only)
    #[arg(long, env = "RAGSTREAM_EMBEDDING_DIMENSIONS")]
    pub embedding_dimensions: Option<usize>,

    /// Provider used to stream answers
    #[arg(long, env = "RAGSTREAM_GENERATION_PROVIDER", value_enum, default_value = "ollama")]
    pub generation_provider: Provider,

    /// Generation model identifier
    #[arg(
        long,
        env = "RAGSTREAM_GENERATION_MODEL",
        default_value = "deepseek-r1:7b-qwen-distill-q4_K_M"
    )]
    pub generation_model: String,

    /// OpenAI API key
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    /// Base URL for OpenAI-compatible endpoints
    #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com/v1")]
    pub openai_base_url: String,

    /// Astra Data API endpoint
    #[arg(long, env = "ASTRA_DB_API_ENDPOINT")]
    pub astra_endpoint: Option<String>,

    /// Astra application token
    #[arg(long, env = "ASTRA_DB_APPLICATION_TOKEN", hide_env_values = true)]
    pub astra_token: Option<String>,

    /// Astra keyspace
    #[arg(long, env = "ASTRA_DB_NAMESPACE", default_value = "default_keyspace")]
    pub astra_namespace: String,

    /// Astra collection
    #[arg(long, env = "ASTRA_DB_COLLECTION")]
    pub astra_collection: Option<String>,

    /// Postgres connection string (postgres://...)
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: Option<String>,

    /// Schema of the fragment table
    #[arg(long, env = "RAGSTREAM_PG_SCHEMA", default_value = "public")]
    pub pg_schema: String,

    /// Fragment table
    #[arg(long, env = "RAGSTREAM_PG_TABLE", default_value = "Chunk")]
    pub pg_table: String,

    /// JSONL file of embedded fragments
    #[arg(long, env = "RAGSTREAM_FRAGMENTS_PATH")]
    pub fragments_path: Option<PathBuf>,

    /// Seconds before embedding and indexed store requests time out
    #[arg(long, env = "RAGSTREAM_REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    pub request_timeout_secs: u64,

    /// Seconds allowed to connect to the generation backend
    #[arg(long, env = "RAGSTREAM_GENERATION_CONNECT_TIMEOUT_SECS", default_value_t = 10)]
    pub generation_connect_timeout_secs: u64,

    /// Overall generation timeout in seconds, stream included (unset: none)
    #[arg(long, env = "RAGSTREAM_GENERATION_TIMEOUT_SECS")]
    pub generation_timeout_secs: Option<u64>,
}

impl PipelineArgs {
    /// Constructs every component once and wires them into a pipeline.
    pub async fn build_pipeline(&self) -> Result<QueryPipeline> {
        let embedder = self.build_embedder()?;
        let store = self.build_store().await?;
        let generator = self.build_generator()?;
        tracing::info!(
            store = store.name(),
            embedding = ?self.embedding_provider,
            generation = ?self.generation_provider,
            top_k = self.top_k,
            "pipeline configured"
        );
        Ok(QueryPipeline::new(embedder, store, generator, self.top_k))
    }

    fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    fn openai_key(&self) -> Result<&str> {
        self.openai_api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .context("--openai-api-key (or OPENAI_API_KEY) is required for the openai provider")
    }

    fn build_embedder(&self) -> Result<Arc<dyn Embedder>> {
        Ok(match self.embedding_provider {
            Provider::Ollama => Arc::new(OllamaEmbedder::new(
                &self.ollama_url,
                self.embedding_model.clone(),
                self.request_timeout(),
            )?),
            Provider::Openai => Arc::new(OpenAiEmbedder::new(
                self.openai_key()?,
                &self.openai_base_url,
                self.embedding_model.clone(),
                self.embedding_dimensions,
                self.request_timeout(),
            )?),
        })
    }

    fn build_generator(&self) -> Result<Arc<dyn Generator>> {
        let connect_timeout = Duration::from_secs(self.generation_connect_timeout_secs.max(1));
        let timeout = self.generation_timeout_secs.map(Duration::from_secs);
        Ok(match self.generation_provider {
            Provider::Ollama => Arc::new(OllamaGenerator::new(
                &self.ollama_url,
                self.generation_model.clone(),
                connect_timeout,
                timeout,
            )?),
            Provider::Openai => Arc::new(OpenAiGenerator::new(
                self.openai_key()?,
                &self.openai_base_url,
                self.generation_model.clone(),
                connect_timeout,
                timeout,
            )?),
        })
    }

    async fn build_store(&self) -> Result<Arc<dyn VectorStore>> {
        Ok(match self.vector_db {
            VectorDb::Astra => {
                let endpoint = self
                    .astra_endpoint
                    .as_deref()
                    .context("ASTRA_DB_API_ENDPOINT is required for --vector-db astra")?;
                let token = self
                    .astra_token
                    .as_deref()
                    .context("ASTRA_DB_APPLICATION_TOKEN is required for --vector-db astra")?;
                let collection = self
                    .astra_collection
                    .as_deref()
                    .context("ASTRA_DB_COLLECTION is required for --vector-db astra")?;
                Arc::new(AstraStore::new(
                    endpoint,
                    token,
                    &self.astra_namespace,
                    collection,
                    self.request_timeout(),
                )?)
            }
            VectorDb::Pgvector => {
                let table = TableName::new(self.pg_schema.clone(), self.pg_table.clone())?;
                let db = connect(self.database_url()?).await?;
                Arc::new(PgVectorStore::new(db, &table))
            }
            VectorDb::Postgres => {
                let table = TableName::new(self.pg_schema.clone(), self.pg_table.clone())?;
                let db = connect(self.database_url()?).await?;
                Arc::new(BruteForceStore::new(PostgresFragments::new(db, &table)))
            }
            VectorDb::Jsonl => {
                let path = self
                    .fragments_path
                    .clone()
                    .context("--fragments-path is required for --vector-db jsonl")?;
                anyhow::ensure!(path.is_file(), "fragment file {} not found", path.display());
                Arc::new(BruteForceStore::new(JsonlFragments::new(path)))
            }
        })
    }

    fn database_url(&self) -> Result<&str> {
        self.database_url
            .as_deref()
            .context("DATABASE_URL is required for the Postgres backends")
    }
}
