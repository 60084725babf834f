//! Anthropic Claude provider implementation

use super::types::{LlmMessage, LlmRequest, LlmResponse, MessageRole, StreamChunk, Usage};
use super::{LlmError, LlmService};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Anthropic model variants.
#[derive(Debug, Clone, Copy)]
pub enum AnthropicModel {
    Claude4Opus,
    Claude4Sonnet,
    Claude35Sonnet,
    Claude35Haiku,
}

impl AnthropicModel {
    pub fn api_name(self) -> &'static str {
        match self {
            AnthropicModel::Claude4Opus => "claude-opus-4-5-20251101",
            AnthropicModel::Claude4Sonnet => "claude-sonnet-4-5-20250929",
            AnthropicModel::Claude35Sonnet => "claude-sonnet-4-20250514",
            AnthropicModel::Claude35Haiku => "claude-haiku-4-5-20251001",
        }
    }

    pub fn context_window(self) -> usize {
        match self {
            AnthropicModel::Claude4Opus
            | AnthropicModel::Claude4Sonnet
            | AnthropicModel::Claude35Sonnet
            | AnthropicModel::Claude35Haiku => 200_000,
        }
    }

    pub fn model_id(self) -> &'static str {
        match self {
            AnthropicModel::Claude4Opus => "claude-4.5-opus",
            AnthropicModel::Claude4Sonnet => "claude-4.5-sonnet",
            AnthropicModel::Claude35Sonnet => "claude-3.5-sonnet",
            AnthropicModel::Claude35Haiku => "claude-4.5-haiku",
        }
    }
}

/// Anthropic service implementation.
pub struct AnthropicService {
    client: Client,
    api_key: String,
    model: AnthropicModel,
    base_url: String,
    model_id: String,
}

impl AnthropicService {
    pub fn new(api_key: String, model: AnthropicModel) -> Self {
        let base_url = "https://api.anthropic.com/v1/messages".to_string();

        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .expect("failed to create HTTP client");

        Self {
            client,
            api_key,
            model,
            base_url,
            model_id: model.model_id().to_string(),
        }
    }

    fn translate_request(&self, request: &LlmRequest, stream: bool) -> AnthropicRequest {
        let messages: Vec<AnthropicMessage> = request.messages.iter().map(Self::translate_message).collect();

        AnthropicRequest {
            model: self.model.api_name().to_string(),
            max_tokens: request.max_tokens.unwrap_or(4096),
            system: request.system.clone(),
            messages,
            temperature: request.temperature,
            stream,
        }
    }

    fn translate_message(msg: &LlmMessage) -> AnthropicMessage {
        let role = match msg.role {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        };

        AnthropicMessage {
            role: role.to_string(),
            content: msg.content.clone(),
        }
    }

    fn normalize_response(resp: AnthropicResponse) -> Result<LlmResponse, LlmError> {
        let text: String = resp
            .content
            .into_iter()
            .filter_map(|block| match block {
                AnthropicContentBlock::Text { text } => Some(text),
            })
            .collect();

        if text.is_empty() {
            tracing::warn!(stop_reason = ?resp.stop_reason, "Anthropic returned empty content");
            return Err(LlmError::unknown(format!(
                "Anthropic returned empty response (stop_reason={:?})",
                resp.stop_reason
            )));
        }

        Ok(LlmResponse {
            text,
            usage: Usage {
                input_tokens: resp.usage.input_tokens,
                output_tokens: resp.usage.output_tokens,
            },
        })
    }

    fn classify_error(status: reqwest::StatusCode, body: &str) -> LlmError {
        let message = body.to_string();
        match status.as_u16() {
            401 | 403 => LlmError::auth(format!("authentication failed: {message}")),
            429 => {
                let mut err = LlmError::rate_limit(format!("rate limited: {message}"));
                if let Ok(parsed) = serde_json::from_str::<serde_json::Value>(body) {
                    if let Some(retry_after) = parsed
                        .get("error")
                        .and_then(|e| e.get("retry_after"))
                        .and_then(serde_json::Value::as_f64)
                    {
                        err = err.with_retry_after(Duration::from_secs_f64(retry_after));
                    }
                }
                err
            }
            400 => LlmError::invalid_request(format!("invalid request: {message}")),
            500..=599 => LlmError::server_error(format!("server error: {message}")),
            _ => LlmError::unknown(format!("HTTP {status}: {message}")),
        }
    }
}

#[async_trait]
impl LlmService for AnthropicService {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let anthropic_request = self.translate_request(request, false);

        let response = self
            .client
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&anthropic_request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::timeout(format!("request timeout: {e}"))
                } else if e.is_connect() {
                    LlmError::network(format!("connection failed: {e}"))
                } else {
                    LlmError::unknown(format!("request failed: {e}"))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LlmError::network(format!("failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(Self::classify_error(status, &body));
        }

        let anthropic_response: AnthropicResponse =
            serde_json::from_str(&body).map_err(|e| LlmError::unknown(format!("failed to parse response: {e}")))?;

        Self::normalize_response(anthropic_response)
    }

    async fn stream(&self, request: &LlmRequest) -> Result<BoxStream<'static, Result<StreamChunk, LlmError>>, LlmError> {
        let anthropic_request = self.translate_request(request, true);

        let response = self
            .client
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&anthropic_request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::timeout(format!("request timeout: {e}"))
                } else if e.is_connect() {
                    LlmError::network(format!("connection failed: {e}"))
                } else {
                    LlmError::unknown(format!("request failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::classify_error(status, &body));
        }

        let byte_stream = response.bytes_stream();
        let parsed = parse_sse_events(byte_stream);
        Ok(Box::pin(parsed))
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn context_window(&self) -> usize {
        self.model.context_window()
    }
}

/// Parser state threaded through [`parse_sse_events`]'s `unfold`.
struct SseState<S> {
    byte_stream: std::pin::Pin<Box<S>>,
    buffer: String,
    queue: std::collections::VecDeque<Result<StreamChunk, LlmError>>,
    done: bool,
}

/// Turns a raw byte stream of `text/event-stream` frames into [`StreamChunk`]s,
/// buffering partial lines across network reads.
fn parse_sse_events(
    byte_stream: impl futures::Stream<Item = reqwest::Result<bytes::Bytes>> + Send + 'static,
) -> impl futures::Stream<Item = Result<StreamChunk, LlmError>> + Send + 'static {
    let state = SseState {
        byte_stream: Box::pin(byte_stream),
        buffer: String::new(),
        queue: std::collections::VecDeque::new(),
        done: false,
    };

    futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.queue.pop_front() {
                return Some((item, state));
            }
            if state.done {
                return None;
            }

            match state.byte_stream.next().await {
                None => {
                    state.done = true;
                    return None;
                }
                Some(Err(e)) => {
                    state.done = true;
                    return Some((Err(LlmError::network(format!("stream read failed: {e}"))), state));
                }
                Some(Ok(bytes)) => {
                    state.buffer.push_str(&String::from_utf8_lossy(&bytes));
                    extract_events(&mut state.buffer, &mut state.queue, &mut state.done);
                }
            }
        }
    })
}

fn extract_events(
    buffer: &mut String,
    queue: &mut std::collections::VecDeque<Result<StreamChunk, LlmError>>,
    done: &mut bool,
) {
    while let Some(pos) = buffer.find("\n\n") {
        let event = buffer[..pos].to_string();
        buffer.drain(..pos + 2);

        let Some(data_line) = event.lines().find(|l| l.starts_with("data:")) else { continue };
        let data = data_line.trim_start_matches("data:").trim();
        if data.is_empty() {
            continue;
        }

        let Ok(value) = serde_json::from_str::<serde_json::Value>(data) else { continue };
        match value.get("type").and_then(|t| t.as_str()) {
            Some("content_block_delta") => {
                if let Some(text) = value.get("delta").and_then(|d| d.get("text")).and_then(|t| t.as_str()) {
                    queue.push_back(Ok(StreamChunk::Text(text.to_string())));
                }
            }
            Some("message_delta") => {
                if let Some(usage) = value.get("usage") {
                    let output_tokens = usage.get("output_tokens").and_then(|v| v.as_u64()).unwrap_or(0);
                    queue.push_back(Ok(StreamChunk::Done(Usage { input_tokens: 0, output_tokens })));
                }
            }
            Some("error") => {
                let message = value
                    .get("error")
                    .and_then(|e| e.get("message"))
                    .and_then(|m| m.as_str())
                    .unwrap_or("unknown stream error");
                queue.push_back(Err(LlmError::unknown(message.to_string())));
                *done = true;
                return;
            }
            _ => {}
        }
    }
}

// Anthropic API types

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    system: String,
    messages: Vec<AnthropicMessage>,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct AnthropicMessage {
    pub(crate) role: String,
    pub(crate) content: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum AnthropicContentBlock {
    Text { text: String },
}

#[derive(Debug, Deserialize)]
pub(crate) struct AnthropicResponse {
    pub(crate) content: Vec<AnthropicContentBlock>,
    pub(crate) stop_reason: Option<String>,
    pub(crate) usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AnthropicUsage {
    pub(crate) input_tokens: u64,
    pub(crate) output_tokens: u64,
}

#[cfg(test)]
pub(crate) mod test_helpers {
    use super::*;
    use crate::llm::types::LlmMessage;

    pub fn translate_message(msg: &LlmMessage) -> AnthropicMessage {
        AnthropicService::translate_message(msg)
    }

    pub fn normalize_response(resp: AnthropicResponse) -> Result<crate::llm::LlmResponse, crate::llm::LlmError> {
        AnthropicService::normalize_response(resp)
    }
}

#[cfg(test)]
mod tests {
    use super::test_helpers::*;
    use super::*;
    use crate::llm::types::LlmMessage;

    #[test]
    fn translate_message_maps_role_and_text() {
        let msg = LlmMessage::user("hello there");
        let translated = translate_message(&msg);
        assert_eq!(translated.role, "user");
        assert_eq!(translated.content, "hello there");
    }

    #[test]
    fn normalize_response_extracts_text_and_usage() {
        let resp = AnthropicResponse {
            content: vec![AnthropicContentBlock::Text { text: "hi".to_string() }],
            stop_reason: Some("end_turn".to_string()),
            usage: AnthropicUsage { input_tokens: 10, output_tokens: 3 },
        };
        let normalized = normalize_response(resp).unwrap();
        assert_eq!(normalized.text, "hi");
        assert_eq!(normalized.usage.output_tokens, 3);
    }

    #[test]
    fn normalize_response_rejects_empty_content() {
        let resp = AnthropicResponse {
            content: vec![],
            stop_reason: Some("end_turn".to_string()),
            usage: AnthropicUsage { input_tokens: 1, output_tokens: 0 },
        };
        assert!(normalize_response(resp).is_err());
    }
}
