//! Relay Server
//!
//! Exposes agent sessions over a WebSocket plus a small HTTP API for
//! inspecting the tool-server pool.
//! This is a library crate; the server is started via `start_server()`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{http::Method, routing::get, Json, Router};
use serde::Serialize;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use relay_core::ai::client::AiClient;
use relay_core::mcp::{load_servers, ToolServerPool};
use relay_core::paths;
use relay_core::{AgentContext, RelayConfig};

pub mod error;
pub mod routes;
pub mod ws;

/// Configuration for starting the server.
pub struct ServerConfig {
    /// Port to listen on (default: 3000).
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 3000 }
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Process-wide agent context; every WebSocket session shares its pool.
    pub agent: Arc<AgentContext>,
}

/// Load config and server list from the config dir, connect the pool and
/// build the LLM client.
///
/// Unreachable tool servers are logged and left unavailable; they never
/// prevent startup.
pub async fn build_context() -> anyhow::Result<Arc<AgentContext>> {
    let mut config = RelayConfig::load(&paths::config_path()).await?;
    config.apply_env_overrides();

    let servers = load_servers(&paths::servers_path()).await;
    let pool = Arc::new(ToolServerPool::with_default_connector(
        servers,
        config.timeouts,
    ));
    for (name, result) in pool.connect_all().await {
        if let Err(e) = result {
            tracing::warn!(server = %name, "Tool server not connected at startup: {}", e);
        }
    }

    let api_key = config.api_key().unwrap_or_else(|| {
        tracing::warn!(
            "No API key found (RELAY_API_KEY or {}); LLM calls will fail until one is configured",
            config.llm.api_key_env
        );
        String::new()
    });
    let llm = Arc::new(AiClient::new(config.client_config(), api_key));

    Ok(Arc::new(AgentContext::new(pool, llm, config)))
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/ws/session", get(ws::session::handler))
        .nest("/api", routes::api_router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the Relay server and block until shutdown.
pub async fn start_server(config: ServerConfig) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    let agent = build_context().await?;
    let pool = Arc::clone(&agent.pool);
    let app = build_router(AppState { agent });

    tracing::info!("Relay server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pool.disconnect_all().await;
    tracing::info!("Relay server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

async fn health(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Json<HealthResponse> {
    let statuses = state.agent.pool.statuses();
    let connected = statuses
        .iter()
        .filter(|(_, s)| matches!(s, relay_core::mcp::ServerStatus::Connected { .. }))
        .count();
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        servers_configured: statuses.len(),
        servers_connected: connected,
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    servers_configured: usize,
    servers_connected: usize,
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use async_trait::async_trait;

    use relay_core::ai::{LanguageModel, LlmError, LlmRequest, LlmResponse};
    use relay_core::config::Timeouts;
    use relay_core::mcp::ToolServerPool;
    use relay_core::{AgentContext, RelayConfig};

    use crate::AppState;

    /// Replies with a fixed text and no tool calls
    pub struct EchoModel;

    #[async_trait]
    impl LanguageModel for EchoModel {
        async fn complete(&self, _request: LlmRequest) -> Result<LlmResponse, LlmError> {
            Ok(LlmResponse {
                text: Some("done".to_string()),
                ..Default::default()
            })
        }
    }

    /// State with an empty tool-server pool
    pub fn state() -> AppState {
        let pool = Arc::new(ToolServerPool::with_default_connector(
            Vec::new(),
            Timeouts::default(),
        ));
        AppState {
            agent: Arc::new(AgentContext::new(
                pool,
                Arc::new(EchoModel),
                RelayConfig::default(),
            )),
        }
    }
}
