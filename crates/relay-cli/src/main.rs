//! Relay - natural-language requests turned into MCP tool calls
//!
//! - `relay serve` - WebSocket session server
//! - `relay chat` - one local session on stdin/stdout
//! - `relay servers` - connectivity check for the configured tool servers

use anyhow::Result;
use clap::{Parser, Subcommand};

use relay_core::paths;

mod chat;
mod serve;
mod servers;

/// Relay - MCP agent
#[derive(Parser)]
#[command(name = "relay")]
#[command(about = "Drive MCP tool servers with natural-language requests", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the session server
    ///
    /// Each WebSocket connection to /ws/session drives one agent session.
    /// Tool servers come from ~/.relay/servers.json (or $RELAY_HOME).
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value_t = 3000)]
        port: u16,
    },

    /// Chat with the agent in this terminal (the default)
    Chat,

    /// Connect every configured tool server and report what it offers
    Servers,
}

/// Route logs to ~/.relay/logs/relay.log so stdout stays with the conversation
fn init_file_logging() -> Result<()> {
    let log_dir = paths::logs_dir();
    if let Err(e) = std::fs::create_dir_all(&log_dir) {
        eprintln!("Failed to create log directory: {}", e);
    }

    #[cfg(unix)]
    let null_device = "/dev/null";
    #[cfg(windows)]
    let null_device = "NUL";

    let log_file = match std::fs::File::create(log_dir.join("relay.log")) {
        Ok(file) => file,
        Err(e) => {
            eprintln!(
                "Failed to create log file: {}, falling back to null device",
                e
            );
            std::fs::File::create(null_device)?
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::sync::Mutex::new(log_file))
        .with_ansi(false)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Serve mode logs to stdout
    if let Some(Commands::Serve { port }) = cli.command {
        return serve::run(port).await;
    }

    init_file_logging()?;

    match cli.command {
        Some(Commands::Servers) => servers::run().await,
        Some(Commands::Chat) | None => chat::run().await,
        Some(Commands::Serve { .. }) => Ok(()),
    }
}
