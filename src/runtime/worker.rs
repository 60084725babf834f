//! Session worker main loop
//!
//! One task per live session (spec §4.2), replacing the teacher's
//! `ConversationRuntime::run`/`process_event` event-driven executor with a
//! pop-schedule-speak loop driven by the `TurnScheduler`.

use super::{InboundRequest, RuntimeAdapter, SessionStore, StreamEvent};
use crate::config::Config;
use crate::db::Message;
use crate::llm::StreamChunk;
use crate::persona::PersonaRegistry;
use crate::runtime::traits::GenerationRequest;
use crate::scheduler::{RandomSource, TurnScheduler};
use chrono::Utc;
use futures::StreamExt;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

/// Hard cap on agent-driven continuation steps per spec §9 (Open Question resolution).
pub const MAX_CONTINUATION: u32 = 6;

const RETRY_ATTEMPTS: u32 = 2;
const RETRY_BASE: Duration = Duration::from_millis(500);

pub struct SessionWorker {
    session_id: String,
    tenant_id: String,
    store: Arc<dyn SessionStore>,
    adapter: Arc<dyn RuntimeAdapter>,
    personas: Arc<PersonaRegistry>,
    scheduler: TurnScheduler,
    rng: Box<dyn RandomSource>,
    inbound_rx: mpsc::Receiver<InboundRequest>,
    broadcast_tx: broadcast::Sender<StreamEvent>,
    config: Config,
    last_speaker: Option<String>,
    cancel: CancellationToken,
}

impl SessionWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session_id: String,
        tenant_id: String,
        store: Arc<dyn SessionStore>,
        adapter: Arc<dyn RuntimeAdapter>,
        personas: Arc<PersonaRegistry>,
        scheduler: TurnScheduler,
        rng: Box<dyn RandomSource>,
        inbound_rx: mpsc::Receiver<InboundRequest>,
        broadcast_tx: broadcast::Sender<StreamEvent>,
        config: Config,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            session_id,
            tenant_id,
            store,
            adapter,
            personas,
            scheduler,
            rng,
            inbound_rx,
            broadcast_tx,
            config,
            last_speaker: None,
            cancel,
        }
    }

    pub async fn run(mut self) {
        tracing::info!(session_id = %self.session_id, "session worker started");

        loop {
            let request = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    tracing::info!(session_id = %self.session_id, "session worker cancelled");
                    break;
                }
                request = self.inbound_rx.recv() => request,
            };

            let Some(request) = request else { break };

            if let Err(e) = self.handle_request(request).await {
                tracing::error!(session_id = %self.session_id, error = %e, "session worker step failed, evicting");
                break;
            }
        }

        tracing::info!(session_id = %self.session_id, "session worker stopped");
    }

    async fn handle_request(&mut self, request: InboundRequest) -> Result<(), crate::db::DbError> {
        let known_handles: HashSet<String> =
            self.personas.list_personas(&self.tenant_id).into_iter().map(|p| p.handle).collect();

        let mut context_tags: Vec<String> = Vec::new();
        let mut seen = HashSet::new();
        for mention in request.target_mentions.iter().chain(parse_mentions(&request.content, &known_handles).iter()) {
            if seen.insert(mention.clone()) {
                context_tags.push(mention.clone());
            }
        }

        let mut is_user_message = true;
        let mut latest_utterance = Some(request.content.clone());
        let mut continuation = 0u32;

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            let speakers = self.scheduler.next_turn(
                &context_tags,
                self.last_speaker.as_deref(),
                is_user_message,
                self.rng.as_mut(),
            );

            if speakers.is_empty() {
                break;
            }

            let mut new_mentions: Vec<String> = Vec::new();
            for speaker in &speakers {
                let Some(profile) = self.personas.get_profile(&self.tenant_id, speaker) else { continue };
                let window = self.config.effective_memory_window(profile.memory_window);
                let history = self.store.list_messages(&self.session_id, window).await?;

                let final_text = self.run_turn(&profile, &history, latest_utterance.clone()).await;
                self.last_speaker = Some(speaker.clone());

                for mention in parse_mentions(&final_text, &known_handles) {
                    if !new_mentions.contains(&mention) {
                        new_mentions.push(mention);
                    }
                }
            }

            continuation += 1;
            if new_mentions.is_empty() || continuation >= MAX_CONTINUATION {
                break;
            }

            // Append rather than replace: a mention carried in from an earlier step but not
            // chosen as a speaker this round (e.g. bumped by `max_agents_per_turn`) must stay
            // eligible for the next scheduling step rather than being silently dropped.
            for mention in new_mentions {
                if seen.insert(mention.clone()) {
                    context_tags.push(mention);
                }
            }
            is_user_message = false;
            latest_utterance = None;
        }

        Ok(())
    }

    async fn run_turn(
        &self,
        profile: &crate::persona::PersonaProfile,
        history: &[Message],
        latest_utterance: Option<String>,
    ) -> String {
        let message_id = format!("{}_{}", safe_id(&profile.handle), short_hex());
        let start = Utc::now();

        let _ = self.broadcast_tx.send(StreamEvent::AgentStart {
            message_id: message_id.clone(),
            sender: profile.handle.clone(),
            session_id: self.session_id.clone(),
            timestamp: start,
        });

        let rag_query = build_rag_query(history, latest_utterance.as_deref());

        let gen_request = GenerationRequest {
            tenant_id: self.tenant_id.clone(),
            persona: profile.clone(),
            history: history.iter().map(|m| (m.sender.clone(), m.content.clone())).collect(),
            latest_utterance,
            rag_query,
            temperature: self.config.temperature,
        };

        let mut buffer = String::new();
        let mut cancelled = false;

        match self.start_stream(gen_request).await {
            Ok(mut chunks) => loop {
                let next = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => {
                        tracing::info!(
                            session_id = %self.session_id,
                            persona = %profile.handle,
                            "generation cancelled, discarding partial buffer"
                        );
                        cancelled = true;
                        break;
                    }
                    next = chunks.next() => next,
                };

                match next {
                    Some(Ok(StreamChunk::Text(text))) => {
                        buffer.push_str(&text);
                        let _ = self.broadcast_tx.send(StreamEvent::AgentChunk {
                            message_id: message_id.clone(),
                            sender: profile.handle.clone(),
                            content: text,
                        });
                    }
                    Some(Ok(StreamChunk::Done(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::warn!(
                            session_id = %self.session_id,
                            persona = %profile.handle,
                            error = %e,
                            "llm stream interrupted, ending turn with partial buffer"
                        );
                        break;
                    }
                }
            },
            Err(e) => {
                tracing::warn!(
                    session_id = %self.session_id,
                    persona = %profile.handle,
                    error = %e,
                    "llm stream failed to start after retries"
                );
            }
        }

        // A cancelled generation's partial output is discarded, never persisted (spec §4.1).
        let persisted_message_id = if cancelled || buffer.is_empty() {
            None
        } else {
            match self.store.append_message(&message_id, &self.session_id, &profile.handle, &buffer).await {
                Ok(message) => Some(message.id),
                Err(e) => {
                    tracing::error!(session_id = %self.session_id, error = %e, "failed to persist agent message");
                    None
                }
            }
        };

        let _ = self.broadcast_tx.send(StreamEvent::AgentEnd {
            message_id,
            sender: profile.handle.clone(),
            content: buffer.clone(),
            timestamp: Utc::now(),
            persisted_message_id,
        });

        buffer
    }

    /// Transient provider errors are retried with exponential backoff (spec §7); exhausted
    /// retries surface the error so the caller can end the turn with whatever was buffered.
    async fn start_stream(
        &self,
        request: GenerationRequest,
    ) -> Result<futures::stream::BoxStream<'static, Result<StreamChunk, crate::llm::LlmError>>, crate::llm::LlmError> {
        let mut attempt = 0;
        loop {
            match self.adapter.stream(request.clone()).await {
                Ok(stream) => return Ok(stream),
                Err(e) if e.kind.is_retryable() && attempt < RETRY_ATTEMPTS => {
                    attempt += 1;
                    let backoff = RETRY_BASE * 2u32.pow(attempt - 1);
                    tracing::warn!(
                        session_id = %self.session_id,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "retrying llm stream start"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Replaces non-alphanumeric characters so a persona handle is safe inside a message id.
fn safe_id(sender: &str) -> String {
    sender.chars().map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' }).collect()
}

fn short_hex() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// Finds `@handle` tokens in free text that match a known persona handle, case-insensitively.
fn parse_mentions(content: &str, known_handles: &HashSet<String>) -> Vec<String> {
    let mut mentions = Vec::new();
    for token in content.split_whitespace() {
        let Some(candidate) = token.strip_prefix('@') else { continue };
        let candidate = candidate.trim_end_matches(|c: char| !c.is_alphanumeric() && c != '_');
        if candidate.is_empty() {
            continue;
        }
        if let Some(handle) = known_handles.iter().find(|h| h.eq_ignore_ascii_case(candidate)) {
            if !mentions.contains(handle) {
                mentions.push(handle.clone());
            }
        }
    }
    mentions
}

/// Query for persona knowledge retrieval: the latest utterance plus the text of up to the
/// previous three history entries (spec §4.5).
fn build_rag_query(history: &[Message], latest_utterance: Option<&str>) -> Option<String> {
    let mut parts: Vec<String> = Vec::new();
    if let Some(text) = latest_utterance {
        parts.push(text.to_string());
    }
    parts.extend(history.iter().rev().take(3).map(|m| m.content.clone()));

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_mentions_matches_known_handles_case_insensitively() {
        let known: HashSet<String> = ["alice".to_string(), "bob".to_string()].into_iter().collect();
        let mentions = parse_mentions("@Bob please weigh in, cc @nobody", &known);
        assert_eq!(mentions, vec!["bob".to_string()]);
    }

    #[test]
    fn build_rag_query_combines_utterance_and_recent_history() {
        let history = vec![
            Message { id: "1".into(), session_id: "s".into(), sender: "user".into(), content: "first".into(), created_at: Utc::now() },
            Message { id: "2".into(), session_id: "s".into(), sender: "alice".into(), content: "second".into(), created_at: Utc::now() },
        ];
        let query = build_rag_query(&history, Some("latest")).unwrap();
        assert!(query.contains("latest"));
        assert!(query.contains("second"));
        assert!(query.contains("first"));
    }

    #[test]
    fn build_rag_query_is_none_when_nothing_to_search() {
        assert!(build_rag_query(&[], None).is_none());
    }
}
