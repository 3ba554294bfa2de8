//! HTTP surface: a streaming chat endpoint plus a liveness probe.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};

use crate::conversation::ConversationTurn;
use crate::error::PipelineError;
use crate::pipeline::QueryPipeline;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<QueryPipeline>,
}

impl AppState {
    /// Wraps a pipeline for use by the handlers.
    pub fn new(pipeline: QueryPipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
        }
    }
}

/// Body of `POST /api/chat`.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    /// Conversation so far; the last entry is the question.
    pub messages: Vec<ConversationTurn>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    message: String,
}

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/chat", post(chat_handler))
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn chat_handler(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Response, ChatError> {
    if request.messages.is_empty() {
        return Err(ChatError::BadRequest("messages must not be empty".into()));
    }
    let events = state
        .pipeline
        .run(&request.messages)
        .await
        .map_err(ChatError::from)?;
    let body = events.map(|event| Ok::<_, Infallible>(Event::default().data(event.sse_data())));
    Ok(Sse::new(body).into_response())
}

/// Failure before the stream starts.
#[derive(Debug)]
enum ChatError {
    BadRequest(String),
    Internal,
}

impl From<PipelineError> for ChatError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::EmptyQuestion => ChatError::BadRequest(err.to_string()),
            other => {
                tracing::error!(error = %other, "chat request failed before streaming");
                ChatError::Internal
            }
        }
    }
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        match self {
            ChatError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorBody { message })).into_response()
            }
            ChatError::Internal => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
            }
        }
    }
}
