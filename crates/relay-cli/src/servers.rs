//! `relay servers`: connectivity check

use anyhow::Result;

use relay_core::config::Timeouts;
use relay_core::mcp::config::mask_secret;
use relay_core::mcp::protocol::McpToolDef;
use relay_core::mcp::{load_servers, ServerStatus, ToolServerPool};
use relay_core::{paths, AgentResult, RelayConfig};

pub async fn run() -> Result<()> {
    let path = paths::servers_path();
    let servers = load_servers(&path).await;
    if servers.is_empty() {
        println!("No tool servers configured in {}", path.display());
        return Ok(());
    }

    let timeouts: Timeouts = RelayConfig::load(&paths::config_path()).await?.timeouts;
    let pool = ToolServerPool::with_default_connector(servers, timeouts);
    pool.connect_all().await;

    for descriptor in pool.descriptors() {
        let status = pool.status(&descriptor.name).unwrap_or(ServerStatus::Disconnected);
        let marker = match &status {
            ServerStatus::Connected { .. } => "\x1b[32m✓\x1b[0m",
            _ => "\x1b[31m✗\x1b[0m",
        };
        println!("{} {} ({})", marker, descriptor.name, descriptor.transport);
        for (key, value) in &descriptor.env {
            println!("    env {}={}", key, mask_secret(key, value));
        }
        match status {
            ServerStatus::Connected { .. } => {
                for line in tool_lines(pool.list_tools(&descriptor.name).await) {
                    println!("{}", line);
                }
            }
            ServerStatus::Unavailable { reason } => println!("    {}", reason),
            ServerStatus::Disconnected => {}
        }
    }

    let catalog = pool.aggregate();
    for error in catalog.collision_errors() {
        println!("\x1b[33m!\x1b[0m {}", error);
    }
    println!(
        "\n{} tool(s) available to the agent",
        catalog.tools.len()
    );

    pool.disconnect_all().await;
    Ok(())
}

/// One line per tool, or the reason the list could not be fetched
fn tool_lines(tools: AgentResult<Vec<McpToolDef>>) -> Vec<String> {
    match tools {
        Ok(tools) => tools.iter().map(|t| format!("    - {}", t.name)).collect(),
        Err(e) => vec![format!("    \x1b[31mtools unavailable: {}\x1b[0m", e)],
    }
}
