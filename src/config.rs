//! Environment-driven configuration
//!
//! Mirrors the teacher's pattern of reading everything out of the environment
//! in one place (see the old `main.rs`'s `PHOENIX_DB_PATH`/`PHOENIX_PORT`
//! reads) but consolidated into a single struct so the rest of the crate
//! never touches `std::env` directly.

#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: String,
    pub port: u16,
    pub memory_window: i64,
    pub max_agents_per_turn: usize,
    pub temperature: f32,
    pub vector_store_uri: String,
    pub encryption_key: Option<String>,
    pub runtime_mode: RuntimeMode,
    pub anthropic_api_key: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeMode {
    /// Deterministic stub provider/embedder; no outbound network calls.
    Stub,
    /// Real provider calls.
    Live,
}

impl Config {
    pub fn from_env() -> Self {
        let db_path = std::env::var("ORCH_DB_PATH").unwrap_or_else(|_| "./orchestrator.db".to_string());

        let port: u16 = std::env::var("ORCH_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);

        let memory_window: i64 = std::env::var("ORCH_MEMORY_WINDOW")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8);

        let max_agents_per_turn: usize = std::env::var("ORCH_MAX_AGENTS_PER_TURN")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(2);

        let temperature: f32 = std::env::var("ORCH_TEMPERATURE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0.4);

        let vector_store_uri = std::env::var("ORCH_VECTOR_STORE_URI")
            .unwrap_or_else(|_| "http://localhost:19530".to_string());

        let encryption_key = std::env::var("ORCH_ENCRYPTION_KEY").ok();

        let runtime_mode = match std::env::var("ORCH_RUNTIME_MODE").as_deref() {
            Ok("live") => RuntimeMode::Live,
            _ => RuntimeMode::Stub,
        };

        let anthropic_api_key = std::env::var("ANTHROPIC_API_KEY").ok();

        Self {
            db_path,
            port,
            memory_window,
            max_agents_per_turn,
            temperature,
            vector_store_uri,
            encryption_key,
            runtime_mode,
            anthropic_api_key,
        }
    }

    /// `memory_window` as used by prompt assembly: `-1` means unbounded.
    pub fn effective_memory_window(&self, persona_window: i64) -> Option<usize> {
        let window = if persona_window != 0 { persona_window } else { self.memory_window };
        if window < 0 {
            None
        } else {
            Some(window as usize)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_memory_window_unbounded() {
        let cfg = Config {
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
        assert_eq!(cfg.effective_memory_window(-1), None);
        assert_eq!(cfg.effective_memory_window(0), Some(8));
        assert_eq!(cfg.effective_memory_window(20), Some(20));
    }
}
