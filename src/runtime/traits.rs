//! Trait abstractions for runtime I/O
//!
//! Mirrors the teacher's `MessageStore`/`LlmClient` seam (`runtime/traits.rs`):
//! async traits over storage and generation, blanket `Arc<T>` impls so a
//! shared handle satisfies the trait directly, and concrete production
//! adapters wrapping the real `Database`/`ModelRegistry`/`RagRetriever`.

use crate::db::{Database, DbError, Message, Session};
use crate::llm::{LlmError, LlmMessage, LlmRequest, ModelRegistry, StreamChunk};
use crate::persona::PersonaProfile;
use crate::rag::RagRetriever;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::Arc;

/// Storage for sessions and their message transcripts.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(
        &self,
        id: &str,
        tenant_id: &str,
        user_id: &str,
        title: Option<&str>,
    ) -> Result<Session, DbError>;

    async fn get_session(&self, id: &str) -> Result<Session, DbError>;

    async fn list_sessions(&self, tenant_id: &str, user_id: &str) -> Result<Vec<Session>, DbError>;

    async fn append_message(
        &self,
        id: &str,
        session_id: &str,
        sender: &str,
        content: &str,
    ) -> Result<Message, DbError>;

    async fn list_messages(&self, session_id: &str, limit: Option<usize>) -> Result<Vec<Message>, DbError>;
}

#[async_trait]
impl<T: SessionStore + ?Sized> SessionStore for Arc<T> {
    async fn create_session(
        &self,
        id: &str,
        tenant_id: &str,
        user_id: &str,
        title: Option<&str>,
    ) -> Result<Session, DbError> {
        (**self).create_session(id, tenant_id, user_id, title).await
    }

    async fn get_session(&self, id: &str) -> Result<Session, DbError> {
        (**self).get_session(id).await
    }

    async fn list_sessions(&self, tenant_id: &str, user_id: &str) -> Result<Vec<Session>, DbError> {
        (**self).list_sessions(tenant_id, user_id).await
    }

    async fn append_message(
        &self,
        id: &str,
        session_id: &str,
        sender: &str,
        content: &str,
    ) -> Result<Message, DbError> {
        (**self).append_message(id, session_id, sender, content).await
    }

    async fn list_messages(&self, session_id: &str, limit: Option<usize>) -> Result<Vec<Message>, DbError> {
        (**self).list_messages(session_id, limit).await
    }
}

/// Production `SessionStore` backed by the sqlite `Database`.
#[derive(Clone)]
pub struct DatabaseStore {
    db: Database,
}

impl DatabaseStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SessionStore for DatabaseStore {
    async fn create_session(
        &self,
        id: &str,
        tenant_id: &str,
        user_id: &str,
        title: Option<&str>,
    ) -> Result<Session, DbError> {
        self.db.create_session(id, tenant_id, user_id, title)
    }

    async fn get_session(&self, id: &str) -> Result<Session, DbError> {
        self.db.get_session(id)
    }

    async fn list_sessions(&self, tenant_id: &str, user_id: &str) -> Result<Vec<Session>, DbError> {
        self.db.list_sessions(tenant_id, user_id)
    }

    async fn append_message(
        &self,
        id: &str,
        session_id: &str,
        sender: &str,
        content: &str,
    ) -> Result<Message, DbError> {
        self.db.append_message(id, session_id, sender, content)
    }

    async fn list_messages(&self, session_id: &str, limit: Option<usize>) -> Result<Vec<Message>, DbError> {
        self.db.list_messages(session_id, limit)
    }
}

/// One turn's worth of context handed to the Runtime Adapter: a persona, its
/// scoped history, and (if it has a knowledge base) a retrieval query.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub tenant_id: String,
    pub persona: PersonaProfile,
    /// The trailing `memory_window` messages, oldest first, rendered `"{sender}: {content}"`.
    pub history: Vec<(String, String)>,
    /// `Some(text)` for a fresh user-triggered step; `None` for a continuation step, which gets
    /// an invite-not-compel nudge instead (spec §4.4 item 4).
    pub latest_utterance: Option<String>,
    /// Pre-built retrieval query (§4.5); ignored unless the persona has a knowledge base.
    pub rag_query: Option<String>,
    pub temperature: f32,
}

/// Turns `(tenant, persona, prompt_bundle)` into a token stream (spec §4.4).
#[async_trait]
pub trait RuntimeAdapter: Send + Sync {
    async fn stream(
        &self,
        request: GenerationRequest,
    ) -> Result<BoxStream<'static, Result<StreamChunk, LlmError>>, LlmError>;
}

#[async_trait]
impl<T: RuntimeAdapter + ?Sized> RuntimeAdapter for Arc<T> {
    async fn stream(
        &self,
        request: GenerationRequest,
    ) -> Result<BoxStream<'static, Result<StreamChunk, LlmError>>, LlmError> {
        (**self).stream(request).await
    }
}

const RAG_HEADER: &str = "\n\n# Background knowledge\n";

/// Production `RuntimeAdapter`: assembles the prompt (system + RAG + history + trailing
/// instruction, per spec §4.4) and drives the active `LlmService` via the `ModelRegistry`.
pub struct LlmRuntimeAdapter {
    llm: Arc<ModelRegistry>,
    rag: Arc<RagRetriever>,
}

impl LlmRuntimeAdapter {
    pub fn new(llm: Arc<ModelRegistry>, rag: Arc<RagRetriever>) -> Self {
        Self { llm, rag }
    }

    fn system_prompt(&self, tenant_id: &str, request: &GenerationRequest) -> String {
        let mut prompt = request.persona.system_prompt();

        if request.persona.has_knowledge_base() {
            if let Some(query) = &request.rag_query {
                let top_k = request
                    .persona
                    .background
                    .as_ref()
                    .map_or(3, |b| b.rag_top_k);
                let context = self.rag.retrieve_context(tenant_id, &request.persona.handle, query, top_k);
                if !context.is_empty() {
                    prompt.push_str(RAG_HEADER);
                    prompt.push_str(&context);
                }
            }
        }

        prompt
    }
}

#[async_trait]
impl RuntimeAdapter for LlmRuntimeAdapter {
    async fn stream(
        &self,
        request: GenerationRequest,
    ) -> Result<BoxStream<'static, Result<StreamChunk, LlmError>>, LlmError> {
        let system = self.system_prompt(&request.tenant_id, &request);

        let mut messages = Vec::new();
        if !request.history.is_empty() {
            let rendered = request
                .history
                .iter()
                .map(|(sender, content)| format!("{sender}: {content}"))
                .collect::<Vec<_>>()
                .join("\n");
            messages.push(LlmMessage::user(format!("Conversation so far:\n{rendered}")));
        }

        let trailing = request.latest_utterance.clone().unwrap_or_else(|| {
            "Continue the conversation naturally if you have something worth adding.".to_string()
        });
        messages.push(LlmMessage::user(trailing));

        let llm_request = LlmRequest {
            system,
            messages,
            max_tokens: Some(1024),
            temperature: request.temperature,
        };

        self.llm.service().stream(&llm_request).await
    }
}
