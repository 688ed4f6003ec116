use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use serde::Deserialize;
use tokio::sync::broadcast;

use crate::chat::ChatOrchestrator;
use crate::errors::ChatError;
use crate::store::{ConversationId, DocumentId};

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub chat: Arc<ChatOrchestrator>,
    pub ws_tx: broadcast::Sender<String>,
}

impl AppState {
    pub fn new(chat: Arc<ChatOrchestrator>) -> Self {
        let ws_tx = chat.event_sender();
        Self { chat, ws_tx }
    }
}

pub type SharedState = Arc<AppState>;

// ── Request payload types ─────────────────────────────────────────────

#[derive(Deserialize, Default)]
pub struct CreateConversationRequest {
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Deserialize)]
pub struct SendMessageRequest {
    pub message: String,
}

#[derive(Deserialize)]
pub struct UrlRequest {
    pub url: String,
}

// ── Error handling ────────────────────────────────────────────────────

pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    PayloadTooLarge(String),
    BadGateway(String),
    Internal(String),
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        let message = err.to_string();
        match err {
            ChatError::ConversationNotFound(_) | ChatError::DocumentNotFound(_) => {
                ApiError::NotFound(message)
            }
            ChatError::ContextTooLarge { .. } => ApiError::PayloadTooLarge(message),
            ChatError::TurnInProgress(_) | ChatError::NothingToRetry(_) => {
                ApiError::Conflict(message)
            }
            ChatError::LlmFailure(_) | ChatError::EmptyReply => ApiError::BadGateway(message),
            ChatError::BadRequest(_) => ApiError::BadRequest(message),
            ChatError::Store(e) => {
                let error = format!("{:#}", e);
                tracing::error!(%error, "Store failure");
                ApiError::Internal(message)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route(
            "/api/conversations",
            get(list_conversations).post(create_conversation),
        )
        .route(
            "/api/conversations/{id}",
            get(get_conversation).delete(delete_conversation),
        )
        .route("/api/conversations/{id}/messages", post(send_message))
        .route("/api/conversations/{id}/retry", post(retry_turn))
        .route("/api/conversations/{id}/title", post(generate_title))
        .route("/api/conversations/{id}/urls", get(list_urls).post(add_url))
        .route(
            "/api/conversations/{id}/urls/{doc}",
            put(edit_url).delete(delete_url),
        )
        .route(
            "/api/conversations/{id}/urls/{doc}/refresh",
            post(refresh_url),
        )
        .route(
            "/api/conversations/{id}/context",
            get(get_context).delete(clear_context),
        )
        .route("/health", get(health_check))
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

async fn list_conversations(
    State(state): State<SharedState>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.chat.list_conversations().await?))
}

async fn create_conversation(
    State(state): State<SharedState>,
    Json(req): Json<CreateConversationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let title = req.title.filter(|t| !t.trim().is_empty());
    let conversation = state.chat.create_conversation(title).await?;
    Ok((StatusCode::CREATED, Json(conversation)))
}

async fn get_conversation(
    State(state): State<SharedState>,
    Path(id): Path<ConversationId>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.chat.get_conversation(id).await?))
}

async fn delete_conversation(
    State(state): State<SharedState>,
    Path(id): Path<ConversationId>,
) -> Result<impl IntoResponse, ApiError> {
    state.chat.delete_conversation(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn send_message(
    State(state): State<SharedState>,
    Path(id): Path<ConversationId>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.chat.send_message(id, &req.message).await?))
}

async fn retry_turn(
    State(state): State<SharedState>,
    Path(id): Path<ConversationId>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.chat.retry_turn(id).await?))
}

async fn generate_title(
    State(state): State<SharedState>,
    Path(id): Path<ConversationId>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.chat.generate_title(id).await?))
}

async fn list_urls(
    State(state): State<SharedState>,
    Path(id): Path<ConversationId>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.chat.list_urls(id).await?))
}

async fn add_url(
    State(state): State<SharedState>,
    Path(id): Path<ConversationId>,
    Json(req): Json<UrlRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let document = state.chat.add_url(id, &req.url).await?;
    Ok((StatusCode::ACCEPTED, Json(document)))
}

async fn refresh_url(
    State(state): State<SharedState>,
    Path((id, doc)): Path<(ConversationId, DocumentId)>,
) -> Result<impl IntoResponse, ApiError> {
    let document = state.chat.refresh_url(id, doc).await?;
    Ok((StatusCode::ACCEPTED, Json(document)))
}

async fn edit_url(
    State(state): State<SharedState>,
    Path((id, doc)): Path<(ConversationId, DocumentId)>,
    Json(req): Json<UrlRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let document = state.chat.edit_url(id, doc, &req.url).await?;
    Ok((StatusCode::ACCEPTED, Json(document)))
}

async fn delete_url(
    State(state): State<SharedState>,
    Path((id, doc)): Path<(ConversationId, DocumentId)>,
) -> Result<impl IntoResponse, ApiError> {
    state.chat.delete_url(id, doc).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_context(
    State(state): State<SharedState>,
    Path(id): Path<ConversationId>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.chat.get_context(id).await?))
}

async fn clear_context(
    State(state): State<SharedState>,
    Path(id): Path<ConversationId>,
) -> Result<impl IntoResponse, ApiError> {
    let removed = state.chat.clear_context(id).await?;
    Ok(Json(serde_json::json!({"removed": removed})))
}
