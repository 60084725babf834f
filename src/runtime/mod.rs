//! Session runtime: one live worker task per session
//!
//! Mirrors the teacher's `RuntimeManager`/`ConversationHandle` (`runtime/mod.rs`):
//! a live-worker map behind an `RwLock`, lazily spawning a worker task on first
//! use and handing callers a cheap-to-clone handle to talk to it.

mod traits;
mod worker;

pub use traits::{DatabaseStore, GenerationRequest, LlmRuntimeAdapter, RuntimeAdapter, SessionStore};
pub use worker::{SessionWorker, MAX_CONTINUATION};

use crate::config::Config;
use crate::db::Session;
use crate::error::AppError;
use crate::persona::{PersonaRegistry, PersonaRef};
use crate::scheduler::{PersonaState, ThreadRandom, TurnScheduler};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio_util::sync::CancellationToken;

/// Inbound requests are queued with a short bound; a worker stuck behind a slow
/// provider call should reject new work rather than let the queue grow unbounded
/// (spec §4.1).
const INBOUND_QUEUE_CAPACITY: usize = 16;
const ENQUEUE_TIMEOUT: Duration = Duration::from_secs(2);
const BROADCAST_CAPACITY: usize = 64;

/// One user (or targeted) message handed to a session's worker.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub content: String,
    pub sender: String,
    /// Handles named via the request's `target_personas`, taking priority over any
    /// `@handle` mentions parsed out of `content` (spec §4.2 step 2).
    pub target_mentions: Vec<String>,
}

/// A streamed event for a session's subscribers (spec §3/§6). Exactly one `AgentStart`
/// precedes all `AgentChunk`s for a given `message_id`, followed by exactly one `AgentEnd`;
/// events for different `message_id`s are never interleaved on a single subscriber.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StreamEvent {
    #[serde(rename = "agent.start")]
    AgentStart {
        message_id: String,
        sender: String,
        session_id: String,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename = "agent.chunk")]
    AgentChunk {
        message_id: String,
        sender: String,
        content: String,
    },
    #[serde(rename = "agent.end")]
    AgentEnd {
        message_id: String,
        sender: String,
        content: String,
        timestamp: DateTime<Utc>,
        #[serde(skip_serializing_if = "Option::is_none")]
        persisted_message_id: Option<String>,
    },
}

/// Handle to a live session worker.
#[derive(Clone)]
pub struct SessionHandle {
    inbound_tx: mpsc::Sender<InboundRequest>,
    broadcast_tx: broadcast::Sender<StreamEvent>,
    cancel: CancellationToken,
}

/// Top-level coordinator: owns the live-worker map and spawns a [`SessionWorker`] task
/// per session on first use, mirroring the teacher's `RuntimeManager::get_or_create`.
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    adapter: Arc<dyn RuntimeAdapter>,
    personas: Arc<PersonaRegistry>,
    config: Config,
    handles: RwLock<HashMap<String, SessionHandle>>,
}

impl SessionManager {
    pub fn new(
        store: Arc<dyn SessionStore>,
        adapter: Arc<dyn RuntimeAdapter>,
        personas: Arc<PersonaRegistry>,
        config: Config,
    ) -> Self {
        Self {
            store,
            adapter,
            personas,
            config,
            handles: RwLock::new(HashMap::new()),
        }
    }

    pub async fn create_session(
        &self,
        id: &str,
        tenant_id: &str,
        user_id: &str,
        title: Option<&str>,
    ) -> Result<Session, AppError> {
        Ok(self.store.create_session(id, tenant_id, user_id, title).await?)
    }

    pub async fn list_sessions(&self, tenant_id: &str, user_id: &str) -> Result<Vec<Session>, AppError> {
        Ok(self.store.list_sessions(tenant_id, user_id).await?)
    }

    pub async fn list_messages(
        &self,
        session_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<crate::db::Message>, AppError> {
        // A session's existence is checked first so callers get a 404 rather than an
        // empty list for a typo'd id.
        self.store.get_session(session_id).await?;
        Ok(self.store.list_messages(session_id, limit).await?)
    }

    pub fn list_personas(&self, tenant_id: &str) -> Vec<PersonaRef> {
        self.personas.list_personas(tenant_id)
    }

    /// Queue a message for a session, spawning its worker if this is the first activity.
    /// The user message is persisted before the worker is ever woken, so it survives even
    /// if the queue is full and the request is rejected (spec §4.1).
    pub async fn enqueue(&self, session_id: &str, request: InboundRequest) -> Result<(), AppError> {
        let session = self.store.get_session(session_id).await?;
        let message_id = format!("{session_id}_{}", uuid::Uuid::new_v4().simple());
        self.store.append_message(&message_id, session_id, &request.sender, &request.content).await?;

        let handle = self.get_or_create(session_id, &session.tenant_id).await;

        match tokio::time::timeout(ENQUEUE_TIMEOUT, handle.inbound_tx.send(request)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) | Err(_) => Err(AppError::Overloaded(format!(
                "session {session_id} is not accepting new messages right now"
            ))),
        }
    }

    pub async fn subscribe(&self, session_id: &str) -> Result<broadcast::Receiver<StreamEvent>, AppError> {
        let session = self.store.get_session(session_id).await?;
        let handle = self.get_or_create(session_id, &session.tenant_id).await;
        Ok(handle.broadcast_tx.subscribe())
    }

    /// Stop every live worker; any in-flight generation is cancelled and its partial output
    /// discarded rather than persisted (spec §4.1). Cancellation unblocks a worker at any
    /// suspension point — queue receive, stream poll, or persistence await — so this returns
    /// as soon as the tokens are signalled, without waiting for the worker tasks to finish
    /// tearing down.
    pub async fn shutdown(&self) {
        let mut handles = self.handles.write().await;
        for (session_id, handle) in handles.drain() {
            tracing::info!(session_id = %session_id, "shutting down session worker");
            handle.cancel.cancel();
        }
    }

    async fn get_or_create(&self, session_id: &str, tenant_id: &str) -> SessionHandle {
        {
            let handles = self.handles.read().await;
            if let Some(handle) = handles.get(session_id) {
                return handle.clone();
            }
        }

        let mut handles = self.handles.write().await;
        if let Some(handle) = handles.get(session_id) {
            return handle.clone();
        }

        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE_CAPACITY);
        let (broadcast_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        let cancel = CancellationToken::new();

        let persona_states: Vec<PersonaState> = self
            .personas
            .list_personas(tenant_id)
            .into_iter()
            .map(|p| PersonaState::new(p.handle, p.proactivity))
            .collect();
        let max_agents = self.personas.max_agents_per_turn(tenant_id, self.config.max_agents_per_turn);
        let scheduler = TurnScheduler::new(persona_states, max_agents as i64);

        let worker = SessionWorker::new(
            session_id.to_string(),
            tenant_id.to_string(),
            self.store.clone(),
            self.adapter.clone(),
            self.personas.clone(),
            scheduler,
            Box::new(ThreadRandom),
            inbound_rx,
            broadcast_tx.clone(),
            self.config.clone(),
            cancel.clone(),
        );

        let session_id_owned = session_id.to_string();
        tokio::spawn(async move {
            worker.run().await;
            tracing::info!(session_id = %session_id_owned, "session worker finished");
        });

        let handle = SessionHandle { inbound_tx, broadcast_tx, cancel };
        handles.insert(session_id.to_string(), handle.clone());
        handle
    }
}
