//! HTTP + WebSocket request handlers

use super::types::{
    CreateSessionRequest, CreateSessionResponse, MessageDto, MessageListResponse, PersonaListResponse,
    SendMessageRequest, SendMessageResponse, SessionListResponse, SessionSummary,
};
use super::ws::run_session_socket;
use super::AppState;
use crate::error::AppError;
use crate::runtime::InboundRequest;

use axum::extract::ws::WebSocketUpgrade;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/sessions", post(create_session).get(list_sessions))
        .route("/api/sessions/:id/messages", post(send_message).get(list_messages))
        .route("/api/ws/sessions/:id", get(session_socket))
        .route("/api/personas", get(list_personas))
        .route("/version", get(version))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct TenantUserQuery {
    pub tenant_id: String,
    pub user_id: String,
}

async fn create_session(
    State(state): State<AppState>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<CreateSessionResponse>), AppError> {
    let id = uuid::Uuid::new_v4().to_string();
    let session = state
        .sessions
        .create_session(&id, &req.tenant_id, &req.user_id, req.title.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(CreateSessionResponse { session_id: session.id })))
}

async fn list_sessions(
    State(state): State<AppState>,
    Query(query): Query<TenantUserQuery>,
) -> Result<Json<SessionListResponse>, AppError> {
    let sessions = state.sessions.list_sessions(&query.tenant_id, &query.user_id).await?;
    Ok(Json(SessionListResponse { sessions: sessions.into_iter().map(SessionSummary::from).collect() }))
}

async fn send_message(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(req): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<SendMessageResponse>), AppError> {
    if req.content.trim().is_empty() {
        return Err(AppError::ValidationError("message content must not be empty".to_string()));
    }

    let request = InboundRequest {
        content: req.content,
        sender: req.sender,
        target_mentions: req.target_personas,
    };
    state.sessions.enqueue(&session_id, request).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SendMessageResponse { session_id, status: "queued".to_string() }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct MessageListQuery {
    pub limit: Option<usize>,
}

async fn list_messages(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<MessageListQuery>,
) -> Result<Json<MessageListResponse>, AppError> {
    let messages = state.sessions.list_messages(&session_id, query.limit).await?;
    Ok(Json(MessageListResponse { messages: messages.into_iter().map(MessageDto::from).collect() }))
}

#[derive(Debug, Deserialize)]
pub struct PersonaQuery {
    pub tenant_id: String,
}

async fn list_personas(State(state): State<AppState>, Query(query): Query<PersonaQuery>) -> Json<PersonaListResponse> {
    Json(PersonaListResponse { personas: state.sessions.list_personas(&query.tenant_id) })
}

async fn session_socket(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    match state.sessions.subscribe(&session_id).await {
        Ok(broadcast_rx) => ws.on_upgrade(move |socket| run_session_socket(socket, broadcast_rx)),
        Err(e) => e.into_response(),
    }
}

async fn version() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "version": env!("CARGO_PKG_VERSION") }))
}
