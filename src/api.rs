//! HTTP surface: signaling relay, chat and health check.

use crate::chat::{ChatResponse, ChatService};
use crate::signaling::{NegotiationMessage, SignalKind, SignalingStore};
use axum::extract::rejection::JsonRejection;
use axum::extract::Query;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Shared state handed to every handler.
pub struct AppState {
    pub store: Arc<SignalingStore>,
    pub chat: ChatService,
}

impl AppState {
    pub fn new(store: Arc<SignalingStore>, chat: ChatService) -> Self {
        Self { store, chat }
    }
}

/// API error type, rendered as `{"error": "<message>"}`.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    InternalServerError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::InternalServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

#[derive(Debug, Deserialize)]
pub struct SignalRequest {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
    #[serde(rename = "peerId")]
    pub peer_id: Option<String>,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Deserialize)]
pub struct SignalQuery {
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SignalsResponse {
    pub signals: Vec<NegotiationMessage>,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: Option<String>,
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Handler for `POST /api/webrtc/signal`.
pub async fn submit_signal_handler(
    Extension(state): Extension<Arc<AppState>>,
    payload: Result<Json<SignalRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(payload) = payload?;

    let session_id = non_empty(payload.session_id)
        .ok_or_else(|| ApiError::BadRequest("Session ID required".into()))?;
    let kind: SignalKind = payload
        .kind
        .as_deref()
        .and_then(|k| k.parse().ok())
        .ok_or_else(|| ApiError::BadRequest("Invalid signal type".into()))?;

    let mut message = NegotiationMessage::new(kind, session_id, payload.data);
    message.peer_id = payload.peer_id;

    tracing::debug!(session = %message.session_id, %kind, "signal submitted");
    state.store.submit(message);

    Ok(Json(json!({ "success": true })))
}

/// Handler for `GET /api/webrtc/signal?sessionId=...`. Unknown or missing
/// sessions read as empty.
pub async fn get_signals_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<SignalQuery>,
) -> Json<SignalsResponse> {
    let signals = match non_empty(query.session_id) {
        Some(id) => state.store.drain(&id),
        None => Vec::new(),
    };
    Json(SignalsResponse { signals })
}

/// Handler for `POST /api/chat`.
pub async fn chat_handler(
    Extension(state): Extension<Arc<AppState>>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(payload) = payload?;

    let (Some(message), Some(session_id), Some(user_id)) = (
        non_empty(payload.message),
        non_empty(payload.session_id),
        non_empty(payload.user_id),
    ) else {
        return Err(ApiError::BadRequest("Missing required fields".into()));
    };

    match state.chat.respond(&session_id, &user_id, &message).await {
        Ok(reply) => Ok(Json(reply)),
        Err(e) => {
            tracing::error!(session = %session_id, error = %e, "chat reply failed");
            Err(ApiError::InternalServerError("Internal server error".into()))
        }
    }
}

/// Health check. Returns server status and crate version.
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router with all routes.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/api/webrtc/signal",
            post(submit_signal_handler).get(get_signals_handler),
        )
        .route("/api/chat", post(chat_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(Extension(state)),
        )
}
