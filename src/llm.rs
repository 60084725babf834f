//! LLM provider abstraction
//!
//! Provides a common interface for interacting with various LLM providers,
//! both as a single completion and as a token stream (the shape the worker
//! actually drives — see `runtime::worker`).

mod anthropic;
mod error;
mod registry;
mod stub;
mod types;

pub use anthropic::{AnthropicModel, AnthropicService};
pub use error::{LlmError, LlmErrorKind};
pub use registry::ModelRegistry;
pub use stub::StubLlmService;
pub use types::*;

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::Arc;

/// Common interface for LLM providers.
#[async_trait]
pub trait LlmService: Send + Sync {
    /// Make a non-streaming completion request.
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError>;

    /// Make a streaming completion request. Each item is a chunk of generated text,
    /// terminated by a final `StreamChunk::Done` carrying usage accounting.
    async fn stream(&self, request: &LlmRequest) -> Result<BoxStream<'static, Result<StreamChunk, LlmError>>, LlmError>;

    /// Get the model ID.
    fn model_id(&self) -> &str;

    /// Get the context window size in tokens.
    fn context_window(&self) -> usize;
}

/// Logging wrapper for LLM services.
pub struct LoggingService {
    inner: Arc<dyn LlmService>,
    model_id: String,
}

impl LoggingService {
    pub fn new(inner: Arc<dyn LlmService>) -> Self {
        let model_id = inner.model_id().to_string();
        Self { inner, model_id }
    }
}

#[async_trait]
impl LlmService for LoggingService {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let start = std::time::Instant::now();
        let result = self.inner.complete(request).await;
        let duration = start.elapsed();

        match &result {
            Ok(response) => {
                tracing::info!(
                    model = %self.model_id,
                    duration_ms = %duration.as_millis(),
                    input_tokens = response.usage.input_tokens,
                    output_tokens = response.usage.output_tokens,
                    "LLM request completed"
                );
            }
            Err(e) => {
                tracing::error!(
                    model = %self.model_id,
                    duration_ms = %duration.as_millis(),
                    error = %e.message,
                    retryable = e.kind.is_retryable(),
                    "LLM request failed"
                );
            }
        }

        result
    }

    async fn stream(&self, request: &LlmRequest) -> Result<BoxStream<'static, Result<StreamChunk, LlmError>>, LlmError> {
        tracing::info!(model = %self.model_id, "LLM stream started");
        self.inner.stream(request).await
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn context_window(&self) -> usize {
        self.inner.context_window()
    }
}
