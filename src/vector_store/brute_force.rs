//! Exhaustive cosine ranking over a flat fragment set.

use std::cmp::Ordering;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::VectorStore;
use crate::embeddings::{EmbeddedFragmentRecord, Fragment, ScoredFragment};
use crate::error::RetrievalError;
use crate::similarity;

/// Bulk reader for every fragment that has a stored embedding.
///
/// No filtering is pushed down; read consistency during one load is the source's concern.
#[async_trait]
pub trait FragmentSource: Send + Sync {
    /// Loads the full fragment set in enumeration order.
    async fn load_all(&self) -> Result<Vec<Fragment>, RetrievalError>;
}

/// Store that ranks every fragment of its source against the query.
pub struct BruteForceStore<S> {
    source: S,
}

impl<S: FragmentSource> BruteForceStore<S> {
    /// Wraps a fragment source.
    pub fn new(source: S) -> Self {
        Self { source }
    }
}

#[async_trait]
impl<S: FragmentSource> VectorStore for BruteForceStore<S> {
    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<Fragment>, RetrievalError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let fragments = self.source.load_all().await?;
        let scored = rank(query, fragments)?;
        Ok(scored
            .into_iter()
            .take(k)
            .map(|candidate| candidate.fragment)
            .collect())
    }

    fn name(&self) -> &'static str {
        "brute-force"
    }
}

/// Scores every fragment and sorts best first. Ties keep enumeration order.
pub fn rank(query: &[f32], fragments: Vec<Fragment>) -> Result<Vec<ScoredFragment>, RetrievalError> {
    let mut scored = Vec::with_capacity(fragments.len());
    for fragment in fragments {
        let score = similarity::cosine(query, &fragment.vector).map_err(|source| {
            RetrievalError::DimensionMismatch {
                id: fragment.id.clone(),
                source,
            }
        })?;
        scored.push(ScoredFragment { fragment, score });
    }
    // `sort_by` is stable.
    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    Ok(scored)
}

/// Fixed in-memory fragment set.
#[derive(Debug, Clone, Default)]
pub struct InMemoryFragments {
    fragments: Vec<Fragment>,
}

impl InMemoryFragments {
    /// Wraps the given fragments.
    pub fn new(fragments: Vec<Fragment>) -> Self {
        Self { fragments }
    }
}

#[async_trait]
impl FragmentSource for InMemoryFragments {
    async fn load_all(&self) -> Result<Vec<Fragment>, RetrievalError> {
        Ok(self.fragments.clone())
    }
}

/// JSONL dump of [`EmbeddedFragmentRecord`] rows, re-read on every search.
#[derive(Debug, Clone)]
pub struct JsonlFragments {
    path: PathBuf,
}

impl JsonlFragments {
    /// Points the source at a JSONL file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl FragmentSource for JsonlFragments {
    async fn load_all(&self) -> Result<Vec<Fragment>, RetrievalError> {
        let file = File::open(&self.path).await?;
        let mut lines = BufReader::new(file).lines();
        let mut fragments = Vec::new();
        let mut line_no = 0usize;
        while let Some(line) = lines.next_line().await? {
            line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            let record: EmbeddedFragmentRecord =
                serde_json::from_str(&line).map_err(|err| RetrievalError::InvalidFragment {
                    line: line_no,
                    message: err.to_string(),
                })?;
            if record.embedding.is_empty() {
                continue;
            }
            fragments.push(record.into());
        }
        Ok(fragments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn fragment(id: &str, vector: Vec<f32>) -> Fragment {
        Fragment::new(id, format!("text {id}"), vector)
    }

    /// Fragments whose cosine against `[1, 0]` is 0.2, 0.9 and 0.5.
    fn scored_fixture() -> Vec<Fragment> {
        let at = |cos: f32| vec![cos, (1.0 - cos * cos).sqrt()];
        vec![
            fragment("low", at(0.2)),
            fragment("high", at(0.9)),
            fragment("mid", at(0.5)),
        ]
    }

    fn ids(fragments: &[Fragment]) -> Vec<&str> {
        fragments.iter().map(|f| f.id.as_str()).collect()
    }

    #[tokio::test]
    async fn returns_top_k_by_descending_score() {
        let store = BruteForceStore::new(InMemoryFragments::new(scored_fixture()));
        let hits = store.search(&[1.0, 0.0], 2).await.unwrap();
        assert_eq!(ids(&hits), vec!["high", "mid"]);
    }

    #[tokio::test]
    async fn large_k_returns_everything_ordered() {
        let store = BruteForceStore::new(InMemoryFragments::new(scored_fixture()));
        let hits = store.search(&[1.0, 0.0], 10).await.unwrap();
        assert_eq!(ids(&hits), vec!["high", "mid", "low"]);
    }

    #[tokio::test]
    async fn zero_k_returns_nothing() {
        let store = BruteForceStore::new(InMemoryFragments::new(scored_fixture()));
        assert!(store.search(&[1.0, 0.0], 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_store_returns_nothing() {
        let store = BruteForceStore::new(InMemoryFragments::default());
        assert!(store.search(&[1.0, 0.0], 10).await.unwrap().is_empty());
    }

    #[test]
    fn ties_keep_enumeration_order() {
        let fragments = vec![
            fragment("a", vec![1.0, 0.0]),
            fragment("b", vec![0.0, 1.0]),
            fragment("c", vec![2.0, 0.0]),
        ];
        let ranked = rank(&[1.0, 0.0], fragments).unwrap();
        let order: Vec<&str> = ranked.iter().map(|s| s.fragment.id.as_str()).collect();
        assert_eq!(order, vec!["a", "c", "b"]);
    }

    #[test]
    fn mismatched_dimension_fails_the_search() {
        let err = rank(&[1.0, 0.0], vec![fragment("bad", vec![1.0, 0.0, 0.0])]).unwrap_err();
        match err {
            RetrievalError::DimensionMismatch { id, source } => {
                assert_eq!(id, "bad");
                assert_eq!((source.left, source.right), (2, 3));
            }
            other => panic!("expected dimension mismatch, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn jsonl_source_skips_blank_lines_and_missing_vectors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"id":"1","content":"alpha","embedding":[1.0,0.0]}}"#).unwrap();
        writeln!(file).unwrap();
        writeln!(file, r#"{{"id":"2","content":"beta","embedding":[]}}"#).unwrap();
        writeln!(file, r#"{{"id":"3","content":"gamma","embedding":[0.0,1.0]}}"#).unwrap();

        let store = BruteForceStore::new(JsonlFragments::new(file.path()));
        let hits = store.search(&[0.0, 1.0], 5).await.unwrap();
        assert_eq!(ids(&hits), vec!["3", "1"]);
        assert_eq!(hits[0].text, "gamma");
    }

    #[tokio::test]
    async fn jsonl_source_reports_bad_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"id":"1","content":"alpha","embedding":[1.0]}}"#).unwrap();
        writeln!(file, "not json").unwrap();

        let store = BruteForceStore::new(JsonlFragments::new(file.path()));
        let err = store.search(&[1.0], 1).await.unwrap_err();
        assert!(matches!(err, RetrievalError::InvalidFragment { line: 2, .. }));
    }

    #[tokio::test]
    async fn missing_jsonl_file_is_a_retrieval_error() {
        let store = BruteForceStore::new(JsonlFragments::new("/nonexistent/fragments.jsonl"));
        let err = store.search(&[1.0], 1).await.unwrap_err();
        assert!(matches!(err, RetrievalError::Io(_)));
    }
}
