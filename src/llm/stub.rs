//! Deterministic stub backend
//!
//! Grounded on `StubRuntimeAdapter` in `runtime_adapter.py`, which echoes the
//! triggering message back prefixed with the sender's name instead of calling
//! out to a real model. Used for `ORCH_RUNTIME_MODE=stub` (the default) and
//! for every test that exercises the worker without a network dependency.

use super::{LlmError, LlmRequest, LlmResponse, LlmService, StreamChunk, Usage};
use async_trait::async_trait;
use futures::stream::{self, BoxStream};

pub struct StubLlmService;

impl StubLlmService {
    pub fn new() -> Self {
        Self
    }

    fn render(request: &LlmRequest) -> String {
        let last_user = request
            .messages
            .iter()
            .rev()
            .find(|m| matches!(m.role, super::MessageRole::User))
            .map(|m| m.content.as_str())
            .unwrap_or("");
        format!("[stub reply to: {last_user}]")
    }
}

impl Default for StubLlmService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmService for StubLlmService {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let text = Self::render(request);
        let output_tokens = text.split_whitespace().count() as u64;
        Ok(LlmResponse { text, usage: Usage { input_tokens: 1, output_tokens } })
    }

    async fn stream(&self, request: &LlmRequest) -> Result<BoxStream<'static, Result<StreamChunk, LlmError>>, LlmError> {
        let text = Self::render(request);
        let words: Vec<String> = text.split(' ').map(|w| format!("{w} ")).collect();
        let output_tokens = words.len() as u64;

        let mut chunks: Vec<Result<StreamChunk, LlmError>> =
            words.into_iter().map(|w| Ok(StreamChunk::Text(w))).collect();
        chunks.push(Ok(StreamChunk::Done(Usage { input_tokens: 1, output_tokens })));

        Ok(Box::pin(stream::iter(chunks)))
    }

    fn model_id(&self) -> &str {
        "stub"
    }

    fn context_window(&self) -> usize {
        200_000
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmMessage;
    use futures::StreamExt;

    fn request(content: &str) -> LlmRequest {
        LlmRequest {
            system: "You are a test persona.".to_string(),
            messages: vec![LlmMessage::user(content)],
            max_tokens: None,
            temperature: 0.4,
        }
    }

    #[tokio::test]
    async fn complete_is_deterministic() {
        let service = StubLlmService::new();
        let a = service.complete(&request("hello")).await.unwrap();
        let b = service.complete(&request("hello")).await.unwrap();
        assert_eq!(a.text, b.text);
        assert!(a.text.contains("hello"));
    }

    #[tokio::test]
    async fn stream_ends_with_done() {
        let service = StubLlmService::new();
        let mut stream = service.stream(&request("ping")).await.unwrap();
        let mut saw_done = false;
        while let Some(item) = stream.next().await {
            if matches!(item.unwrap(), StreamChunk::Done(_)) {
                saw_done = true;
            }
        }
        assert!(saw_done);
    }
}
