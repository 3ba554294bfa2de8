//! Top-K fragment retrieval behind one contract.
//!
//! Indexed backends ([`AstraStore`], [`PgVectorStore`]) delegate ranking to the external index.
//! [`BruteForceStore`] scores every stored fragment itself: O(N·D) per query, meant as a
//! correctness-first fallback rather than a scalable path.

use anyhow::Result;
use async_trait::async_trait;

use crate::embeddings::Fragment;
use crate::error::RetrievalError;

pub mod astra;
pub mod brute_force;
pub mod pgvector;
pub mod postgres;

pub use self::astra::{fragment_from_document, AstraStore};
pub use self::brute_force::{BruteForceStore, FragmentSource, InMemoryFragments, JsonlFragments};
pub use self::pgvector::PgVectorStore;
pub use self::postgres::PostgresFragments;

/// Returns up to `k` fragments most similar to a query vector, best first.
///
/// `k == 0` and an empty store both yield an empty result rather than an error.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Searches for the `k` nearest fragments.
    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<Fragment>, RetrievalError>;

    /// Short backend label for logs.
    fn name(&self) -> &'static str;
}

/// Fully-qualified Postgres table name (schema + table).
#[derive(Debug, Clone)]
pub struct TableName {
    schema: String,
    table: String,
}

impl TableName {
    /// Builds a new table identifier.
    pub fn new<S, T>(schema: S, table: T) -> Result<Self>
    where
        S: Into<String>,
        T: Into<String>,
    {
        let schema = schema.into();
        let table = table.into();
        anyhow::ensure!(!schema.trim().is_empty(), "schema name is required");
        anyhow::ensure!(!table.trim().is_empty(), "table name is required");
        Ok(Self { schema, table })
    }

    /// Fully-qualified table reference with quoted identifiers.
    pub fn qualified(&self) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(&self.table))
    }

    /// Returns the raw schema string.
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Returns the raw table string.
    pub fn table(&self) -> &str {
        &self.table
    }
}

/// Quotes Postgres identifiers, escaping embedded quotes.
pub fn quote_ident(input: &str) -> String {
    let escaped = input.replace('"', "\"\"");
    format!("\"{}\"", escaped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualified_names_preserve_case() {
        let table = TableName::new("public", "Chunk").unwrap();
        assert_eq!(table.qualified(), r#""public"."Chunk""#);
    }

    #[test]
    fn embedded_quotes_are_escaped() {
        assert_eq!(quote_ident(r#"we"ird"#), r#""we""ird""#);
    }

    #[test]
    fn blank_parts_are_rejected() {
        assert!(TableName::new(" ", "chunks").is_err());
        assert!(TableName::new("public", "").is_err());
    }
}
