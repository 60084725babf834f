//! Runtime backend selection
//!
//! Unlike the teacher's multi-provider `ModelRegistry` (one service per model
//! ID, selectable per request), this spec only ever runs one backend at a
//! time, chosen once at startup by `ORCH_RUNTIME_MODE`: either the
//! deterministic stub (default, and always used in tests) or a live Anthropic
//! client. The registry still exists as a seam so the worker never
//! constructs a concrete `LlmService` itself.

use super::{AnthropicModel, AnthropicService, LlmService, LoggingService, StubLlmService};
use crate::config::{Config, RuntimeMode};
use std::sync::Arc;

pub struct ModelRegistry {
    service: Arc<dyn LlmService>,
}

impl ModelRegistry {
    pub fn new(config: &Config) -> Self {
        let service: Arc<dyn LlmService> = match config.runtime_mode {
            RuntimeMode::Live => match &config.anthropic_api_key {
                Some(key) => Arc::new(LoggingService::new(Arc::new(AnthropicService::new(
                    key.clone(),
                    AnthropicModel::Claude4Sonnet,
                )))),
                None => {
                    tracing::warn!("ORCH_RUNTIME_MODE=live but ANTHROPIC_API_KEY is unset; falling back to stub");
                    Arc::new(StubLlmService::new())
                }
            },
            RuntimeMode::Stub => Arc::new(StubLlmService::new()),
        };

        Self { service }
    }

    /// A registry that always uses the deterministic stub backend, for tests.
    pub fn new_stub() -> Self {
        Self { service: Arc::new(StubLlmService::new()) }
    }

    pub fn service(&self) -> Arc<dyn LlmService> {
        self.service.clone()
    }

    pub fn model_id(&self) -> &str {
        self.service.model_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_stub_backend() {
        let config = Config {
            db_path: String::new(),
            port: 0,
            memory_window: 8,
            max_agents_per_turn: 2,
            temperature: 0.4,
            vector_store_uri: String::new(),
            encryption_key: None,
            runtime_mode: RuntimeMode::Stub,
            anthropic_api_key: None,
        };
        let registry = ModelRegistry::new(&config);
        assert_eq!(registry.model_id(), "stub");
    }

    #[test]
    fn live_mode_without_api_key_falls_back_to_stub() {
        let config = Config {
            db_path: String::new(),
            port: 0,
            memory_window: 8,
            max_agents_per_turn: 2,
            temperature: 0.4,
            vector_store_uri: String::new(),
            encryption_key: None,
            runtime_mode: RuntimeMode::Live,
            anthropic_api_key: None,
        };
        let registry = ModelRegistry::new(&config);
        assert_eq!(registry.model_id(), "stub");
    }
}
