//! HTTP + WebSocket API for the orchestrator

mod handlers;
mod ws;
mod types;

pub use handlers::create_router;
#[allow(unused_imports)] // Public API re-exports
pub use types::*;

use crate::persona::PersonaRegistry;
use crate::runtime::SessionManager;
use std::sync::Arc;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionManager>,
    pub personas: Arc<PersonaRegistry>,
}

impl AppState {
    pub fn new(sessions: Arc<SessionManager>, personas: Arc<PersonaRegistry>) -> Self {
        Self { sessions, personas }
    }
}
