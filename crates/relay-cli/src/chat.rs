//! `relay chat`: one agent session on stdin/stdout
//!
//! Every line typed is a user message. While the agent waits on `ask_user`
//! the next line is the answer. `/quit` or end of input terminates.

use std::io::Write;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use relay_core::{AgentSession, LoopEvent};

const QUIT: &str = "/quit";

fn prompt() {
    print!("\x1b[1;36m>\x1b[0m ");
    let _ = std::io::stdout().flush();
}

/// Print events until the session closes its sink
async fn print_events(mut events: mpsc::UnboundedReceiver<LoopEvent>) {
    let mut in_run = false;
    while let Some(event) = events.recv().await {
        match event {
            LoopEvent::LoopStarted => in_run = true,
            LoopEvent::ToolCalled { tool_name } => println!("  \x1b[2m→ {}\x1b[0m", tool_name),
            LoopEvent::Message { text } => {
                println!("{}", text);
                if !in_run {
                    prompt();
                }
            }
            LoopEvent::UserInputRequested { text } => {
                println!("\x1b[1;33m?\x1b[0m {}", text);
                prompt();
            }
            LoopEvent::Error { description } => {
                println!("  \x1b[31m✗ {}\x1b[0m", description);
                if !in_run {
                    prompt();
                }
            }
            LoopEvent::LoopAborted { reason } => println!("  \x1b[33mStopped: {}\x1b[0m", reason),
            LoopEvent::LoopFinished => {
                in_run = false;
                prompt();
            }
        }
    }
}

pub async fn run() -> Result<()> {
    let agent = relay_server::build_context().await?;
    let pool = std::sync::Arc::clone(&agent.pool);
    let (session, events) = AgentSession::open(agent)?;
    tracing::info!(session_id = %session.id(), "Chat session started");

    let connected = pool
        .statuses()
        .iter()
        .filter(|(_, s)| matches!(s, relay_core::mcp::ServerStatus::Connected { .. }))
        .count();
    println!(
        "Relay chat. {} of {} tool server(s) connected. Type {} to exit.",
        connected,
        pool.statuses().len(),
        QUIT
    );
    prompt();

    let printer = tokio::spawn(print_events(events));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line == QUIT {
            break;
        }
        if line.is_empty() {
            prompt();
            continue;
        }
        session.send_user_message(line);
    }

    session.terminate();
    let _ = printer.await;
    pool.disconnect_all().await;
    println!();
    Ok(())
}
