//! Coastal API - Disaster-preparedness chatbot backend for the Corpus
//! Christi region.
//!
//! This crate provides:
//! - An LLM chat pipeline with prompt sandboxing and response validation
//! - Conversation history with session management
//! - A safety-evaluation questionnaire scorer
//! - Weather (NWS) and traffic (Overpass) context providers
//! - An admin-only interaction log
//!
//! ## Architecture
//!
//! ```text
//! Client → sanitize → assemble context → dispatch (LLM) → validate
//!                           ↓
//!                  weather / traffic / history
//! ```

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod context;
pub mod evaluation;
pub mod history;
pub mod interaction_log;
pub mod pipeline;
pub mod provider;
pub mod routes;
pub mod sandbox;

pub use context::{ChatContext, TrafficClient, WeatherClient};
pub use history::{ConversationMessage, FileHistoryStore, HistoryStore, MemoryHistoryStore};
pub use interaction_log::InteractionLog;
pub use pipeline::{ChatOutcome, ChatPipeline};
pub use provider::{ChatRequest, ChatResponse, CompatibleProvider, Provider, ProviderError};
pub use routes::{build_router, AppState};
pub use sandbox::PromptSandbox;

use coastal_common::config::Config;
use std::net::SocketAddr;
use std::sync::Arc;

/// Assemble the application state from configuration.
pub fn build_state(config: &Config) -> AppState {
    let provider: Option<Arc<dyn Provider>> = match config.secrets.groq_api_key.as_deref() {
        Some(key) if !key.is_empty() => match config.provider.base_url.as_deref() {
            Some(base_url) => Some(Arc::new(CompatibleProvider::custom(
                "groq",
                base_url,
                Some(key),
            ))),
            None => Some(Arc::new(CompatibleProvider::groq(Some(key)))),
        },
        _ => {
            tracing::warn!("No Groq API key configured; running in offline mode");
            None
        }
    };

    let history: Arc<dyn HistoryStore> = if config.storage.ephemeral {
        Arc::new(MemoryHistoryStore::new())
    } else {
        Arc::new(FileHistoryStore::open(&config.storage.history_file))
    };

    let interaction_log = if config.storage.ephemeral {
        Arc::new(InteractionLog::in_memory())
    } else {
        Arc::new(InteractionLog::open(&config.storage.interaction_log_file))
    };

    AppState {
        pipeline: Arc::new(ChatPipeline::new(provider, config.provider.model.clone())),
        history,
        interaction_log,
        weather: Some(Arc::new(WeatherClient::new())),
        traffic: Some(Arc::new(TrafficClient::new())),
        city: config.city.clone(),
        admin_password: config.admin.password.clone(),
    }
}

/// Start the API server.
pub async fn start_server(config: &Config) -> anyhow::Result<()> {
    let addr = SocketAddr::from((
        config.server.host.parse::<std::net::IpAddr>()?,
        config.server.port,
    ));

    let router = build_router(build_state(config));

    tracing::info!("Starting Coastal API on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
