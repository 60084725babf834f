//! Multi-tenant AI-persona group-chat orchestrator
//!
//! Serves a small HTTP + WebSocket API in front of a per-session worker pool
//! that schedules which configured persona speaks next and streams their
//! replies back to subscribers.

mod api;
mod config;
mod db;
mod error;
mod llm;
mod persona;
mod rag;
mod runtime;
mod scheduler;

use api::{create_router, AppState};
use config::Config;
use db::Database;
use llm::ModelRegistry;
use persona::{PersonaBackground, PersonaProfile, PersonaRegistry, TenantPersonaConfig};
use rag::RagRetriever;
use runtime::{DatabaseStore, LlmRuntimeAdapter, SessionManager};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "persona_orchestrator=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = Config::from_env();

    if let Some(parent) = PathBuf::from(&config.db_path).parent() {
        std::fs::create_dir_all(parent)?;
    }

    tracing::info!(path = %config.db_path, "opening database");
    let db = Database::open(&config.db_path)?;

    let llm_registry = Arc::new(ModelRegistry::new(&config));
    tracing::info!(model = %llm_registry.model_id(), mode = ?config.runtime_mode, "llm backend initialized");

    let rag = Arc::new(RagRetriever::with_defaults());
    let personas = Arc::new(PersonaRegistry::new());
    register_demo_tenant(&personas, &rag);

    let store = Arc::new(DatabaseStore::new(db));
    let adapter = Arc::new(LlmRuntimeAdapter::new(llm_registry, rag));
    let sessions = Arc::new(SessionManager::new(store, adapter, personas.clone(), config.clone()));

    let state = AppState::new(sessions.clone(), personas);

    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);
    let compression = CompressionLayer::new().gzip(true).br(true).deflate(true).zstd(true);

    let app = create_router(state).layer(cors).layer(compression);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("orchestrator listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    tracing::info!("stopping session workers");
    sessions.shutdown().await;

    Ok(())
}

/// Resolves on SIGINT (Ctrl-C) or SIGTERM so in-flight session workers get a chance to be
/// cancelled (spec §4.1 `shutdown()`) instead of being killed mid-generation by the process exit.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to install ctrl-c handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => tracing::warn!(error = %e, "failed to install sigterm handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// Registers a starter tenant so the binary is immediately exercisable without an external
/// config source. A real deployment would load this from a database-backed admin API instead.
fn register_demo_tenant(personas: &PersonaRegistry, rag: &RagRetriever) {
    let aria = PersonaProfile {
        handle: "aria".to_string(),
        display_name: "Aria".to_string(),
        prompt: "You are Aria, an upbeat product analyst who loves digging into data.".to_string(),
        proactivity: 0.7,
        catchphrases: vec!["Let's dig in.".to_string()],
        background: Some(PersonaBackground {
            content: None,
            source: "background".to_string(),
            rag_enabled: true,
            rag_top_k: 3,
        }),
        memory_window: 0,
    };

    let milo = PersonaProfile {
        handle: "milo".to_string(),
        display_name: "Milo".to_string(),
        prompt: "You are Milo, a skeptical reviewer who asks pointed follow-up questions.".to_string(),
        proactivity: 0.3,
        catchphrases: vec![],
        background: None,
        memory_window: 0,
    };

    rag.ingest(
        "demo",
        "aria",
        "backstory",
        "Aria previously worked as a data scientist at a logistics startup before joining the team.",
    );

    personas.register_tenant(
        "demo",
        TenantPersonaConfig { personas: vec![aria, milo], max_agents_per_turn: Some(2), memory_window: Some(8) },
    );
}
