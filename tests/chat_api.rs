use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use bytes::Bytes;
use futures_util::{stream, StreamExt};
use ragstream::embedder::Embedder;
use ragstream::generator::{Generator, RawStream, WireFormat};
use ragstream::server::{router, AppState};
use ragstream::vector_store::{BruteForceStore, InMemoryFragments};
use ragstream::{Embedding, EmbeddingError, Fragment, GenerationError, QueryPipeline};
use serde_json::{json, Value};
use tower::ServiceExt;

struct UnitEmbedder {
    fail: bool,
}

#[async_trait]
impl Embedder for UnitEmbedder {
    async fn embed(&self, _text: &str) -> Result<Embedding, EmbeddingError> {
        if self.fail {
            return Err(EmbeddingError::MalformedResponse("boom".into()));
        }
        Ok(vec![1.0, 0.0])
    }
}

struct CannedGenerator {
    chunks: Vec<&'static str>,
}

#[async_trait]
impl Generator for CannedGenerator {
    async fn start(&self, _prompt: &str) -> Result<RawStream, GenerationError> {
        let chunks: Vec<Result<Bytes, GenerationError>> = self
            .chunks
            .iter()
            .map(|chunk| Ok(Bytes::from(*chunk)))
            .collect();
        Ok(stream::iter(chunks).boxed())
    }

    fn wire_format(&self) -> WireFormat {
        WireFormat::OllamaNdjson
    }
}

fn app(fail_embedding: bool, chunks: Vec<&'static str>) -> axum::Router {
    let store = BruteForceStore::new(InMemoryFragments::new(vec![Fragment::new(
        "1",
        "Paris is the capital of France.",
        vec![1.0, 0.0],
    )]));
    let pipeline = QueryPipeline::new(
        Arc::new(UnitEmbedder {
            fail: fail_embedding,
        }),
        Arc::new(store),
        Arc::new(CannedGenerator { chunks }),
        5,
    );
    router(AppState::new(pipeline))
}

fn chat_request(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/chat")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn chat_streams_sse_events_then_done() {
    let app = app(
        false,
        vec![
            "{\"response\":\"<think>capital lookup</think>Paris\"}\n",
            "{\"response\":\".\",\"done\":true}\n",
        ],
    );
    let response = app
        .oneshot(chat_request(json!({
            "messages": [{ "role": "user", "content": "Capital of France?" }]
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/event-stream"
    );
    assert_eq!(
        response.headers().get(header::CACHE_CONTROL).unwrap(),
        "no-cache"
    );

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = String::from_utf8(body.to_vec()).unwrap();
    let frames: Vec<&str> = body.split("\n\n").filter(|f| !f.is_empty()).collect();
    assert_eq!(frames.len(), 3);
    assert_eq!(frames[2], "data: [DONE]");

    let first: Value = serde_json::from_str(frames[0].strip_prefix("data: ").unwrap()).unwrap();
    let second: Value = serde_json::from_str(frames[1].strip_prefix("data: ").unwrap()).unwrap();
    assert_eq!(first["role"], "assistant");
    assert_eq!(first["content"], "Paris");
    assert_eq!(second["content"], ".");
    assert_eq!(first["id"], second["id"]);
}

#[tokio::test]
async fn pre_stream_failure_is_an_opaque_500() {
    let response = app(true, Vec::new())
        .oneshot(chat_request(json!({
            "messages": [{ "role": "user", "content": "anything" }]
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"Internal Server Error");
}

#[tokio::test]
async fn blank_question_is_a_400() {
    let response = app(false, Vec::new())
        .oneshot(chat_request(json!({
            "messages": [{ "role": "user", "content": "  " }]
        })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn empty_history_is_a_400() {
    let response = app(false, Vec::new())
        .oneshot(chat_request(json!({ "messages": [] })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn healthz_reports_ok() {
    let response = app(false, Vec::new())
        .oneshot(
            Request::builder()
                .uri("/healthz")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
