//! Common types for LLM interactions
//!
//! Personas never call tools, so unlike the teacher's `ContentBlock` these
//! messages carry plain text only.

/// A request to a runtime adapter's model: a system prompt, a temperature, and
/// a trailing window of conversation turns.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub system: String,
    pub messages: Vec<LlmMessage>,
    pub max_tokens: Option<u32>,
    pub temperature: f32,
}

/// One turn in the prompt's message list.
#[derive(Debug, Clone)]
pub struct LlmMessage {
    pub role: MessageRole,
    pub content: String,
}

impl LlmMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: MessageRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: MessageRole::Assistant, content: content.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    User,
    Assistant,
}

/// A non-streaming completion response.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub text: String,
    pub usage: Usage,
}

/// One increment of a streamed completion.
#[derive(Debug, Clone)]
pub enum StreamChunk {
    /// A slice of generated text.
    Text(String),
    /// The stream has ended; carries final usage accounting.
    Done(Usage),
}

#[derive(Debug, Clone, Default)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl Usage {
    pub fn is_zero(&self) -> bool {
        self.input_tokens == 0 && self.output_tokens == 0
    }
}
