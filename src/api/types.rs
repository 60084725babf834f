//! API request and response types

use crate::persona::PersonaRef;
use serde::{Deserialize, Serialize};

/// Request to create a new session.
#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub tenant_id: String,
    pub user_id: String,
    #[serde(default)]
    pub title: Option<String>,
}

/// Response after creating a session.
#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub session_id: String,
}

/// A session summary returned from the list endpoint.
#[derive(Debug, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub tenant_id: String,
    pub user_id: String,
    pub title: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<crate::db::Session> for SessionSummary {
    fn from(s: crate::db::Session) -> Self {
        Self {
            session_id: s.id,
            tenant_id: s.tenant_id,
            user_id: s.user_id,
            title: s.title,
            created_at: s.created_at,
        }
    }
}

/// Response with a list of sessions.
#[derive(Debug, Serialize)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionSummary>,
}

/// Request to send a message into a session.
#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
    #[serde(default = "default_sender")]
    pub sender: String,
    /// Explicit persona handles to target, taking priority over any `@handle` mentions
    /// parsed out of `content`.
    #[serde(default)]
    pub target_personas: Vec<String>,
}

fn default_sender() -> String {
    "user".to_string()
}

/// Response acknowledging a queued message.
#[derive(Debug, Serialize)]
pub struct SendMessageResponse {
    pub session_id: String,
    pub status: String,
}

/// A single transcript entry.
#[derive(Debug, Serialize)]
pub struct MessageDto {
    pub id: String,
    pub sender: String,
    pub content: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<crate::db::Message> for MessageDto {
    fn from(m: crate::db::Message) -> Self {
        Self { id: m.id, sender: m.sender, content: m.content, created_at: m.created_at }
    }
}

/// Response with a session's message transcript.
#[derive(Debug, Serialize)]
pub struct MessageListResponse {
    pub messages: Vec<MessageDto>,
}

/// Response with a tenant's configured persona roster.
#[derive(Debug, Serialize)]
pub struct PersonaListResponse {
    pub personas: Vec<PersonaRef>,
}

/// Error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self { error: message.into() }
    }
}
