//! Relay Server
//!
//! Standalone binary; `relay serve` starts the same server.

use relay_server::{start_server, ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let port = match std::env::var("PORT") {
        Ok(port) => port.parse()?,
        Err(_) => ServerConfig::default().port,
    };
    start_server(ServerConfig { port }).await
}
