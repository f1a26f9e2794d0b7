//! Subprocess transport: newline-delimited JSON over stdin/stdout

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::McpTransport;
use crate::mcp::config::{mask_secret, ServerDescriptor};
use crate::mcp::protocol::{McpMessage, McpNotification, McpRequest};

type Reply = std::result::Result<Value, String>;
type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Reply>>>>;

/// Stdio transport for a locally spawned server
pub struct StdioTransport {
    server: String,
    stdin: tokio::sync::Mutex<ChildStdin>,
    child: tokio::sync::Mutex<Child>,
    pending: PendingMap,
    next_id: AtomicU64,
    alive: Arc<AtomicBool>,
    shutdown: CancellationToken,
}

impl StdioTransport {
    /// Spawn the server process and start reading its stdout
    pub fn spawn(server: &ServerDescriptor) -> Result<Self> {
        let command = server
            .command
            .as_deref()
            .ok_or_else(|| anyhow!("stdio server '{}' has no command", server.name))?;

        info!(server = %server.name, "Spawning tool server: {} {:?}", command, server.args);
        for (key, value) in &server.env {
            debug!(server = %server.name, "  env {}={}", key, mask_secret(key, value));
        }

        let mut child = Command::new(command)
            .args(&server.args)
            .envs(&server.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    anyhow!("Command not found: {}. Is it installed and in PATH?", command)
                } else {
                    anyhow!("Failed to spawn {}: {}", command, e)
                }
            })?;

        let stdin = child.stdin.take().context("child has no stdin")?;
        let stdout = child.stdout.take().context("child has no stdout")?;
        let stderr = child.stderr.take().context("child has no stderr")?;

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let alive = Arc::new(AtomicBool::new(true));
        let shutdown = CancellationToken::new();

        tokio::spawn(receive_loop(
            server.name.clone(),
            stdout,
            Arc::clone(&pending),
            Arc::clone(&alive),
            shutdown.clone(),
        ));
        tokio::spawn(forward_stderr(server.name.clone(), stderr, shutdown.clone()));

        Ok(Self {
            server: server.name.clone(),
            stdin: tokio::sync::Mutex::new(stdin),
            child: tokio::sync::Mutex::new(child),
            pending,
            next_id: AtomicU64::new(1),
            alive,
            shutdown,
        })
    }

    async fn send_line(&self, line: &str) -> Result<()> {
        let mut stdin = self.stdin.lock().await;
        let written = async {
            stdin.write_all(line.as_bytes()).await?;
            stdin.write_all(b"\n").await?;
            stdin.flush().await
        }
        .await;
        if let Err(e) = written {
            self.alive.store(false, Ordering::SeqCst);
            return Err(anyhow!("write to '{}' failed: {}", self.server, e));
        }
        debug!(server = %self.server, "Sent: {}", line);
        Ok(())
    }
}

/// Register a request unless the receive loop has already shut down.
///
/// `alive` is read under the pending lock; the receive loop clears it under
/// the same lock before draining, so every registered request is answered.
fn register(pending: &PendingMap, alive: &AtomicBool, id: u64) -> Option<oneshot::Receiver<Reply>> {
    let mut map = pending.lock();
    if !alive.load(Ordering::SeqCst) {
        return None;
    }
    let (tx, rx) = oneshot::channel();
    map.insert(id, tx);
    Some(rx)
}

/// Removes a request from the pending map when its caller goes away
struct PendingGuard<'a> {
    pending: &'a PendingMap,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.lock().remove(&self.id);
    }
}

#[async_trait]
impl McpTransport for StdioTransport {
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let line = serde_json::to_string(&McpRequest::new(id, method, params))?;

        let rx = register(&self.pending, &self.alive, id)
            .ok_or_else(|| anyhow!("server '{}' is not running", self.server))?;
        let _guard = PendingGuard {
            pending: &self.pending,
            id,
        };

        self.send_line(&line).await?;
        match rx.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(message)) => Err(anyhow!(message)),
            Err(_) => Err(anyhow!("connection to '{}' closed", self.server)),
        }
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        let line = serde_json::to_string(&McpNotification::new(method, params))?;
        self.send_line(&line).await
    }

    async fn is_alive(&self) -> bool {
        if !self.alive.load(Ordering::SeqCst) {
            return false;
        }
        let mut child = self.child.lock().await;
        matches!(child.try_wait(), Ok(None))
    }
}

impl Drop for StdioTransport {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn receive_loop<R>(
    server: String,
    stdout: R,
    pending: PendingMap,
    alive: Arc<AtomicBool>,
    shutdown: CancellationToken,
) where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stdout).lines();
    let reason = loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => break "transport closed".to_string(),
            line = lines.next_line() => line,
        };
        match line {
            Ok(Some(line)) => dispatch(&server, line.trim(), &pending),
            Ok(None) => break "server closed stdout".to_string(),
            Err(e) => break format!("read error: {}", e),
        }
    };

    debug!(server = %server, "Receive loop ended: {}", reason);
    let orphaned: Vec<_> = {
        let mut map = pending.lock();
        alive.store(false, Ordering::SeqCst);
        map.drain().map(|(_, tx)| tx).collect()
    };
    for tx in orphaned {
        let _ = tx.send(Err(format!("connection lost: {}", reason)));
    }
}

fn dispatch(server: &str, line: &str, pending: &PendingMap) {
    if !line.starts_with('{') {
        if !line.is_empty() {
            debug!(server = %server, "Skipping non-JSON line: {}", line);
        }
        return;
    }
    debug!(server = %server, "Received: {}", line);

    let message: McpMessage = match serde_json::from_str(line) {
        Ok(message) => message,
        Err(e) => {
            warn!(server = %server, "Unparsable message: {}", e);
            return;
        }
    };
    let Some(id) = message.response_id() else {
        if let Some(method) = &message.method {
            debug!(server = %server, "Ignoring server message: {}", method);
        }
        return;
    };
    let Some(tx) = pending.lock().remove(&id) else {
        debug!(server = %server, "Response for unknown request {}", id);
        return;
    };
    let _ = tx.send(message.into_result().map_err(|e| e.to_string()));
}

async fn forward_stderr<R>(server: String, stderr: R, shutdown: CancellationToken)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stderr).lines();
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            line = lines.next_line() => match line {
                Ok(Some(line)) => debug!(server = %server, "stderr: {}", line),
                _ => break,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn receive_loop_routes_responses_and_fails_the_rest_on_eof() {
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let (tx1, rx1) = oneshot::channel();
        let (tx2, rx2) = oneshot::channel();
        pending.lock().insert(1, tx1);
        pending.lock().insert(2, tx2);

        let body = concat!(
            "server starting up\n",
            "{\"jsonrpc\":\"2.0\",\"method\":\"notifications/tools/list_changed\"}\n",
            "{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{\"tools\":[]}}\n",
        );
        let alive = Arc::new(AtomicBool::new(true));
        receive_loop(
            "desktop".to_string(),
            body.as_bytes(),
            Arc::clone(&pending),
            Arc::clone(&alive),
            CancellationToken::new(),
        )
        .await;

        assert_eq!(rx1.await.unwrap().unwrap(), json!({"tools": []}));
        assert!(rx2.await.unwrap().unwrap_err().contains("connection lost"));
        assert!(!alive.load(Ordering::SeqCst));
        assert!(pending.lock().is_empty());
    }

    #[tokio::test]
    async fn requests_registered_before_shutdown_fail_and_later_ones_are_refused() {
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let alive = Arc::new(AtomicBool::new(true));
        let early = register(&pending, &alive, 1).unwrap();

        receive_loop(
            "desktop".to_string(),
            "".as_bytes(),
            Arc::clone(&pending),
            Arc::clone(&alive),
            CancellationToken::new(),
        )
        .await;

        assert!(early.await.unwrap().unwrap_err().contains("server closed stdout"));
        assert!(register(&pending, &alive, 2).is_none());
        assert!(pending.lock().is_empty());
    }

    #[tokio::test]
    async fn spawn_reports_missing_command() {
        let server = ServerDescriptor {
            name: "ghost".into(),
            transport: crate::mcp::config::TransportKind::Stdio,
            host: String::new(),
            port: None,
            client_name: "relay".into(),
            streaming: false,
            command: Some("relay-definitely-not-installed".into()),
            args: vec![],
            env: HashMap::new(),
        };
        let err = StdioTransport::spawn(&server).err().unwrap();
        assert!(err.to_string().contains("Command not found"));
    }
}
