//! Flat Postgres fragment table read in bulk for brute-force ranking.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio_postgres::{Client, NoTls, Row};

use super::brute_force::FragmentSource;
use super::TableName;
use crate::embeddings::Fragment;
use crate::error::RetrievalError;

/// Reads `{id, content, embedding}` rows where `embedding` is a `float8[]` column.
#[derive(Clone)]
pub struct PostgresFragments {
    db: Arc<Client>,
    select_sql: Arc<String>,
}

impl PostgresFragments {
    /// Wraps an open connection.
    pub fn new(db: Arc<Client>, table: &TableName) -> Self {
        Self {
            db,
            select_sql: Arc::new(select_all_sql(table)),
        }
    }
}

#[async_trait]
impl FragmentSource for PostgresFragments {
    async fn load_all(&self) -> Result<Vec<Fragment>, RetrievalError> {
        let rows = self.db.query(self.select_sql.as_str(), &[]).await?;
        rows.iter().map(fragment_from_row).collect()
    }
}

fn fragment_from_row(row: &Row) -> Result<Fragment, RetrievalError> {
    let id: String = row.try_get("id")?;
    let content: String = row.try_get("content")?;
    let embedding: Vec<f64> = row.try_get("embedding")?;
    Ok(Fragment {
        id,
        text: content,
        vector: embedding.into_iter().map(|v| v as f32).collect(),
    })
}

fn select_all_sql(table: &TableName) -> String {
    format!(
        "SELECT id::text AS id, content, embedding \
        FROM {} \
        WHERE embedding IS NOT NULL",
        table.qualified()
    )
}

/// Opens a Postgres connection and drives it on a background task.
pub async fn connect(database_url: &str) -> Result<Arc<Client>> {
    let (client, connection) = tokio_postgres::connect(database_url, NoTls)
        .await
        .context("failed to connect to Postgres")?;
    tokio::spawn(async move {
        if let Err(err) = connection.await {
            tracing::error!(error = %err, "postgres connection error");
        }
    });
    Ok(Arc::new(client))
}
