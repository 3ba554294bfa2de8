//! pgvector-backed nearest-neighbour search.

use std::sync::Arc;

use async_trait::async_trait;
use pgvector::Vector;
use tokio_postgres::Client;

use super::{TableName, VectorStore};
use crate::embeddings::Fragment;
use crate::error::RetrievalError;

/// Indexed store that lets pgvector order rows by cosine distance.
#[derive(Clone)]
pub struct PgVectorStore {
    db: Arc<Client>,
    query_sql: Arc<String>,
}

impl PgVectorStore {
    /// Wraps an open connection to a table with a `vector` column named `embedding`.
    pub fn new(db: Arc<Client>, table: &TableName) -> Self {
        Self {
            db,
            query_sql: Arc::new(select_sql(table)),
        }
    }
}

#[async_trait]
impl VectorStore for PgVectorStore {
    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<Fragment>, RetrievalError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let vector = Vector::from(query.to_vec());
        let limit = i64::try_from(k).unwrap_or(i64::MAX);
        let rows = self
            .db
            .query(self.query_sql.as_str(), &[&vector, &limit])
            .await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let content: Option<String> = row.try_get("content")?;
            let Some(text) = content.filter(|text| !text.trim().is_empty()) else {
                continue;
            };
            let id: String = row.try_get("id")?;
            let embedding: Vector = row.try_get("embedding")?;
            out.push(Fragment {
                id,
                text,
                vector: embedding.to_vec(),
            });
        }
        Ok(out)
    }

    fn name(&self) -> &'static str {
        "pgvector"
    }
}

fn select_sql(table: &TableName) -> String {
    format!(
        "SELECT \
            id::text AS id, \
            content, \
            embedding \
        FROM {} \
        ORDER BY embedding <=> $1 ASC \
        LIMIT $2",
        table.qualified()
    )
}
