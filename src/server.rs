//! HTTP routes backing the chat widget.
//!
//! - POST /api/chat            proxy a conversation to the AI gateway, streamed as SSE
//! - POST /api/mirror/thread   open a mirror thread for a session
//! - POST /api/mirror/message  relay one message into a mirror thread
//! - GET  /health              liveness plus whether mirroring is configured
//!
//! Upstream failures are logged here and answered with static error bodies.

use std::{convert::Infallible, sync::Arc};

use anyhow::Result;
use async_stream::stream;
use axum::{
    extract::{Json, State},
    http::{HeaderMap, StatusCode},
    response::{
        sse::{Event as SseEvent, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Router,
};
use chrono::Utc;
use futures::stream::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

use crate::{
    chat::ChatMessage,
    completion::{CompletionService, StreamEvent},
    entity::Role,
    interface::{format_mirror_message, opening_line, thread_title, ThreadRelay},
    mirror::MIRROR_CONTENT_LIMIT,
};

// -----------------------------------------------------------------------------
// Errors
// -----------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Mirroring not configured")]
    NotConfigured,

    #[error("{0}")]
    Upstream(&'static str),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotConfigured | ApiError::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

// -----------------------------------------------------------------------------
// Request bodies
// -----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadRequest {
    #[serde(default)]
    pub chat_id: Option<String>,
    #[serde(default)]
    pub first_message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorMessageRequest {
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub content: Option<Value>,
    #[serde(default)]
    pub role: Option<String>,
}

// -----------------------------------------------------------------------------
// Server State
// -----------------------------------------------------------------------------

pub struct AppState {
    pub completion: Arc<dyn CompletionService>,
    pub relay: Option<Arc<dyn ThreadRelay>>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/chat", post(chat_handler))
        .route("/api/mirror/thread", post(thread_handler))
        .route("/api/mirror/message", post(message_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bind and serve until `shutdown` resolves.
pub async fn serve(
    state: Arc<AppState>,
    port: u16,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    info!("Chat routes listening on port {}", port);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

// -----------------------------------------------------------------------------
// Handlers
// -----------------------------------------------------------------------------

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "mirror": if state.relay.is_some() { "configured" } else { "disabled" },
    }))
}

async fn chat_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    if req.messages.is_empty() {
        return Err(ApiError::BadRequest("messages are required".to_string()));
    }

    let session = req.id.unwrap_or_else(|| "anonymous".to_string());
    let upstream = state.completion.stream(req.messages).await.map_err(|e| {
        error!("Chat API error for {}: {:#}", session, e);
        ApiError::Upstream("Internal Server Error")
    })?;

    let frames = stream! {
        let mut upstream = upstream;
        let mut failed = false;

        while let Some(item) = upstream.next().await {
            match item {
                Ok(delta) => yield Ok(frame(&StreamEvent::TextDelta { delta })),
                Err(e) => {
                    error!("Chat stream for {} broke: {:#}", session, e);
                    failed = true;
                    break;
                }
            }
        }

        if failed {
            yield Ok(frame(&StreamEvent::Error));
        } else {
            yield Ok(frame(&StreamEvent::Finish));
        }
    };

    Ok(Sse::new(frames).keep_alive(KeepAlive::default()))
}

fn frame(event: &StreamEvent) -> SseEvent {
    let data = serde_json::to_string(event).unwrap_or_else(|_| r#"{"type":"error"}"#.to_string());
    SseEvent::default().data(data)
}

async fn thread_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ThreadRequest>,
) -> Result<Json<Value>, ApiError> {
    let chat_id = req
        .chat_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::BadRequest("chatId is required".to_string()))?;

    let relay = state.relay.as_ref().ok_or(ApiError::NotConfigured)?;

    let title = thread_title(&chat_id, Utc::now().date_naive());
    let opening = opening_line(req.first_message.as_deref());

    let thread_id = relay.open_thread(&title, &opening).await.map_err(|e| {
        error!("Failed to create mirror thread: {:#}", e);
        ApiError::Upstream("Failed to create thread")
    })?;

    Ok(Json(json!({ "threadId": thread_id })))
}

async fn message_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<MirrorMessageRequest>,
) -> Result<Json<Value>, ApiError> {
    let (thread_id, content, role) = validate_message(req)?;

    let relay = state.relay.as_ref().ok_or(ApiError::NotConfigured)?;

    let ip = client_ip(&headers);
    let text = format_mirror_message(&content, role, ip.as_deref());

    relay.post(&thread_id, &text).await.map_err(|e| {
        error!("Failed to post mirror message: {:#}", e);
        ApiError::Upstream("Failed to post message")
    })?;

    Ok(Json(json!({ "success": true })))
}

fn validate_message(req: MirrorMessageRequest) -> Result<(String, String, Role), ApiError> {
    let missing =
        || ApiError::BadRequest("threadId, content, and role are required".to_string());

    let thread_id = req.thread_id.filter(|t| !t.is_empty()).ok_or_else(missing)?;
    let content = match req.content {
        None | Some(Value::Null) => return Err(missing()),
        Some(Value::String(s)) if s.is_empty() => return Err(missing()),
        Some(other) => other,
    };
    let role = req.role.filter(|r| !r.is_empty()).ok_or_else(missing)?;

    let content = match content {
        Value::String(s) if s.chars().count() <= MIRROR_CONTENT_LIMIT => s,
        _ => {
            return Err(ApiError::BadRequest(format!(
                "Content must be a string of at most {} characters",
                MIRROR_CONTENT_LIMIT
            )))
        }
    };

    let role: Role = role
        .parse()
        .map_err(|_| ApiError::BadRequest("role must be 'user' or 'assistant'".to_string()))?;

    Ok((thread_id, content, role))
}

/// First address the proxy chain reports for the caller.
pub fn client_ip(headers: &HeaderMap) -> Option<String> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    if let Some(forwarded) = header("x-forwarded-for") {
        if let Some(first) = forwarded.split(',').next() {
            return Some(first.trim().to_string());
        }
    }

    header("x-real-ip")
        .or_else(|| header("cf-connecting-ip"))
        .map(str::to_string)
}
