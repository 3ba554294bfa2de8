//! Astra DB Data API collection with a native vector index.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use url::Url;

use super::VectorStore;
use crate::embedder::body_text;
use crate::embeddings::Fragment;
use crate::error::RetrievalError;

/// Text-bearing document fields, in precedence order.
pub const TEXT_FIELDS: [&str; 2] = ["content", "text"];

/// Indexed store backed by an Astra DB collection queried with `$vector` sort.
#[derive(Clone)]
pub struct AstraStore {
    client: Client,
    endpoint: String,
}

impl AstraStore {
    /// Builds a client for `{api_endpoint}/api/json/v1/{keyspace}/{collection}`.
    pub fn new(
        api_endpoint: &str,
        token: &str,
        keyspace: &str,
        collection: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let base = Url::parse(api_endpoint)
            .with_context(|| format!("invalid Astra API endpoint {api_endpoint}"))?;
        anyhow::ensure!(!token.trim().is_empty(), "missing Astra application token");
        anyhow::ensure!(!keyspace.trim().is_empty(), "missing Astra keyspace");
        anyhow::ensure!(!collection.trim().is_empty(), "missing Astra collection");
        let mut headers = HeaderMap::new();
        headers.insert(
            "token",
            HeaderValue::from_str(token.trim()).context("invalid Astra application token")?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("failed to build Astra HTTP client")?;
        let endpoint = format!(
            "{}/api/json/v1/{}/{}",
            base.as_str().trim_end_matches('/'),
            keyspace.trim(),
            collection.trim()
        );
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl VectorStore for AstraStore {
    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<Fragment>, RetrievalError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let request = FindCommand {
            find: FindBody {
                sort: json!({ "$vector": query }),
                options: FindOptions { limit: k },
                projection: json!({ "$vector": 1, "content": 1, "text": 1 }),
            },
        };
        let resp = self.client.post(&self.endpoint).json(&request).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let message = body_text(resp).await;
            return Err(RetrievalError::Status { status, message });
        }
        let payload: FindResponse = resp.json().await?;
        if let Some(errors) = payload.errors.filter(|errors| !errors.is_empty()) {
            let message = errors
                .iter()
                .map(|err| err.message.as_deref().unwrap_or("unknown error"))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(RetrievalError::Status { status, message });
        }
        let documents = payload.data.map(|data| data.documents).unwrap_or_default();
        Ok(documents
            .iter()
            .filter_map(fragment_from_document)
            .take(k)
            .collect())
    }

    fn name(&self) -> &'static str {
        "astra"
    }
}

/// Maps a raw document to a [`Fragment`].
///
/// Text comes from the first of [`TEXT_FIELDS`] that holds a non-blank string; documents with
/// neither are dropped. `_id` becomes the fragment id and `$vector`, when projected, its vector.
pub fn fragment_from_document(document: &Map<String, Value>) -> Option<Fragment> {
    let text = TEXT_FIELDS.iter().find_map(|field| {
        document
            .get(*field)
            .and_then(Value::as_str)
            .filter(|text| !text.trim().is_empty())
    })?;
    let id = match document.get("_id") {
        Some(Value::String(id)) => id.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    };
    let vector = document
        .get("$vector")
        .and_then(Value::as_array)
        .map(|values| {
            values
                .iter()
                .filter_map(Value::as_f64)
                .map(|v| v as f32)
                .collect()
        })
        .unwrap_or_default();
    Some(Fragment {
        id,
        text: text.to_string(),
        vector,
    })
}

#[derive(Serialize)]
struct FindCommand {
    find: FindBody,
}

#[derive(Serialize)]
struct FindBody {
    sort: Value,
    options: FindOptions,
    projection: Value,
}

#[derive(Serialize)]
struct FindOptions {
    limit: usize,
}

#[derive(Debug, Deserialize)]
struct FindResponse {
    #[serde(default)]
    data: Option<FindData>,
    #[serde(default)]
    errors: Option<Vec<ApiError>>,
}

#[derive(Debug, Deserialize)]
struct FindData {
    #[serde(default)]
    documents: Vec<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: Option<String>,
}
