//! `relay serve`: session server on stdout logging

use anyhow::Result;

use relay_core::paths;
use relay_server::{start_server, ServerConfig};

/// Run the serve command.
pub async fn run(port: u16) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    print_banner(port);
    start_server(ServerConfig { port }).await?;
    println!("\n  Shut down.");
    Ok(())
}

fn print_banner(port: u16) {
    println!();
    println!("  \x1b[1;36mRelay\x1b[0m server starting");
    println!("  ─────────────────────────────────────");
    println!("  Local:    http://localhost:{}", port);
    println!("  Session:  ws://localhost:{}/ws/session", port);
    println!("  Servers:  {}", paths::servers_path().display());
    println!();
}
