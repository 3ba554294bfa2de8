use std::time::Duration;

use futures_util::StreamExt;
use ragstream::embedder::{Embedder, OllamaEmbedder, OpenAiEmbedder};
use ragstream::generator::{Generator, OllamaGenerator, OpenAiGenerator, WireFormat};
use ragstream::vector_store::{AstraStore, VectorStore};
use ragstream::{reframe, EmbeddingError, GenerationError, ReframedEvent, RetrievalError};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn ollama_embedder_posts_model_and_prompt() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embeddings"))
        .and(body_partial_json(
            json!({ "model": "nomic-embed-text", "prompt": "what is rust?" }),
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "embedding": [0.5, -1.0, 2.0] })))
        .expect(1)
        .mount(&server)
        .await;

    let embedder = OllamaEmbedder::new(&server.uri(), "nomic-embed-text".into(), TIMEOUT).unwrap();
    let vector = embedder.embed("what is rust?").await.unwrap();
    assert_eq!(vector, vec![0.5, -1.0, 2.0]);
}

#[tokio::test]
async fn ollama_embedder_rejects_missing_embedding() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "vector": [1.0] })))
        .mount(&server)
        .await;

    let embedder = OllamaEmbedder::new(&server.uri(), "m".into(), TIMEOUT).unwrap();
    let err = embedder.embed("q").await.unwrap_err();
    assert!(matches!(err, EmbeddingError::MalformedResponse(_)));
}

#[tokio::test]
async fn ollama_embedder_surfaces_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embeddings"))
        .respond_with(ResponseTemplate::new(404).set_body_string("model not found"))
        .mount(&server)
        .await;

    let embedder = OllamaEmbedder::new(&server.uri(), "m".into(), TIMEOUT).unwrap();
    match embedder.embed("q").await.unwrap_err() {
        EmbeddingError::Status { status, body } => {
            assert_eq!(status.as_u16(), 404);
            assert_eq!(body, "model not found");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn openai_embedder_sends_bearer_and_picks_first_index() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "text-embedding-3-small",
            "input": ["hello"],
            "dimensions": 2
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                { "index": 1, "embedding": [9.0, 9.0] },
                { "index": 0, "embedding": [0.1, 0.2] }
            ]
        })))
        .mount(&server)
        .await;

    let embedder = OpenAiEmbedder::new(
        "sk-test",
        &format!("{}/v1", server.uri()),
        "text-embedding-3-small".into(),
        Some(2),
        TIMEOUT,
    )
    .unwrap();
    assert_eq!(embedder.embed("hello").await.unwrap(), vec![0.1, 0.2]);
}

#[tokio::test]
async fn astra_find_maps_documents_in_rank_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/json/v1/ks/docs"))
        .and(header("token", "AstraCS:secret"))
        .and(body_partial_json(json!({
            "find": {
                "sort": { "$vector": [1.0, 0.0] },
                "options": { "limit": 3 }
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "documents": [
                    { "_id": "a", "content": "first", "$vector": [1.0, 0.0] },
                    { "_id": "b", "text": "second" },
                    { "_id": "c", "other": "dropped" }
                ]
            }
        })))
        .mount(&server)
        .await;

    let store = AstraStore::new(&server.uri(), "AstraCS:secret", "ks", "docs", TIMEOUT).unwrap();
    let fragments = store.search(&[1.0, 0.0], 3).await.unwrap();
    let ids: Vec<&str> = fragments.iter().map(|f| f.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b"]);
    assert_eq!(fragments[0].text, "first");
    assert_eq!(fragments[0].vector, vec![1.0, 0.0]);
    assert_eq!(fragments[1].text, "second");
    assert!(fragments[1].vector.is_empty());
}

#[tokio::test]
async fn astra_error_payload_fails_the_search() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errors": [{ "message": "collection does not exist" }]
        })))
        .mount(&server)
        .await;

    let store = AstraStore::new(&server.uri(), "t", "ks", "missing", TIMEOUT).unwrap();
    match store.search(&[1.0], 2).await.unwrap_err() {
        RetrievalError::Status { message, .. } => {
            assert!(message.contains("collection does not exist"))
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn astra_zero_k_skips_the_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let store = AstraStore::new(&server.uri(), "t", "ks", "docs", TIMEOUT).unwrap();
    assert!(store.search(&[1.0], 0).await.unwrap().is_empty());
}

#[tokio::test]
async fn ollama_generator_streams_through_the_reframer() {
    let server = MockServer::start().await;
    let body = concat!(
        "{\"response\":\"<think>\",\"done\":false}\n",
        "{\"response\":\"hmm</think>Paris\",\"done\":false}\n",
        "{\"response\":\" is the capital.\",\"done\":false}\n",
        "{\"response\":\"\",\"done\":true}\n",
    );
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_partial_json(json!({ "model": "deepseek-r1", "stream": true })))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/x-ndjson"))
        .mount(&server)
        .await;

    let generator = OllamaGenerator::new(
        &server.uri(),
        "deepseek-r1".into(),
        TIMEOUT,
        Some(TIMEOUT),
    )
    .unwrap();
    assert_eq!(generator.wire_format(), WireFormat::OllamaNdjson);
    let raw = generator.start("prompt").await.unwrap();
    let events: Vec<ReframedEvent> = reframe(raw, generator.wire_format(), "s".into())
        .collect()
        .await;
    let text: String = events
        .iter()
        .filter_map(|event| match event {
            ReframedEvent::Delta(event) => Some(event.content.as_str()),
            ReframedEvent::Done => None,
        })
        .collect();
    assert_eq!(text, "Paris is the capital.");
    assert_eq!(events.last(), Some(&ReframedEvent::Done));
}

#[tokio::test]
async fn ollama_generator_fails_before_streaming_on_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(500).set_body_string("out of memory"))
        .mount(&server)
        .await;

    let generator = OllamaGenerator::new(&server.uri(), "m".into(), TIMEOUT, None).unwrap();
    match generator.start("prompt").await.err().unwrap() {
        GenerationError::Status { status, body } => {
            assert_eq!(status.as_u16(), 500);
            assert_eq!(body, "out of memory");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn openai_generator_streams_sse_deltas() {
    let server = MockServer::start().await;
    let body = concat!(
        "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
        "data: [DONE]\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "gpt-4o-mini",
            "stream": true,
            "messages": [{ "role": "user", "content": "prompt" }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let generator = OpenAiGenerator::new(
        "sk-test",
        &server.uri(),
        "gpt-4o-mini".into(),
        TIMEOUT,
        None,
    )
    .unwrap();
    let raw = generator.start("prompt").await.unwrap();
    let events: Vec<ReframedEvent> = reframe(raw, WireFormat::OpenAiSse, "s".into())
        .collect()
        .await;
    let text: Vec<&str> = events
        .iter()
        .filter_map(|event| match event {
            ReframedEvent::Delta(event) => Some(event.content.as_str()),
            ReframedEvent::Done => None,
        })
        .collect();
    assert_eq!(text, vec!["Hel", "lo"]);
    assert_eq!(events.len(), 3);
}
