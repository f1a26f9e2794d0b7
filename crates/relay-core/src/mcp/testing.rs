//! In-process tool servers for tests

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::Notify;

use super::config::{ServerDescriptor, TransportKind};
use super::pool::Connector;
use super::protocol::McpToolDef;
use super::transport::McpTransport;
use crate::constants::mcp::PROTOCOL_VERSION;

pub(crate) fn descriptor(name: &str) -> ServerDescriptor {
    ServerDescriptor {
        name: name.to_string(),
        transport: TransportKind::Stdio,
        host: String::new(),
        port: None,
        client_name: "relay-test".to_string(),
        streaming: false,
        command: Some(format!("{}-mcp", name)),
        args: Vec::new(),
        env: HashMap::new(),
    }
}

/// Scripted behavior of one fake server
#[derive(Default)]
pub(crate) struct FakeServer {
    tools: Vec<McpToolDef>,
    failing: HashSet<String>,
    hanging: HashSet<String>,
    delays: HashMap<String, Duration>,
}

impl FakeServer {
    pub(crate) fn new(tools: &[&str]) -> Self {
        Self {
            tools: tools
                .iter()
                .map(|name| McpToolDef {
                    name: name.to_string(),
                    description: Some(format!("{} tool", name)),
                    input_schema: json!({"type": "object", "properties": {}}),
                })
                .collect(),
            ..Default::default()
        }
    }

    /// Calls to `tool` return a JSON-RPC error
    pub(crate) fn failing(mut self, tool: &str) -> Self {
        self.failing.insert(tool.to_string());
        self
    }

    /// Calls to `tool` never answer
    pub(crate) fn hanging(mut self, tool: &str) -> Self {
        self.hanging.insert(tool.to_string());
        self
    }

    /// Calls to `tool` answer after `delay`
    pub(crate) fn slow(mut self, tool: &str, delay: Duration) -> Self {
        self.delays.insert(tool.to_string(), delay);
        self
    }
}

#[derive(Clone)]
struct ServerHandle {
    script: Arc<FakeServer>,
    killed: Arc<AtomicBool>,
    calls: Arc<Mutex<Vec<String>>>,
    call_started: Arc<Notify>,
    abandoned: Arc<AtomicUsize>,
}

#[derive(Default)]
pub(crate) struct FakeConnector {
    servers: HashMap<String, ServerHandle>,
    unreachable: HashSet<String>,
    connects: Arc<AtomicUsize>,
}

impl FakeConnector {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_server(mut self, name: &str, server: FakeServer) -> Self {
        self.servers.insert(
            name.to_string(),
            ServerHandle {
                script: Arc::new(server),
                killed: Arc::new(AtomicBool::new(false)),
                calls: Arc::new(Mutex::new(Vec::new())),
                call_started: Arc::new(Notify::new()),
                abandoned: Arc::new(AtomicUsize::new(0)),
            },
        );
        self
    }

    pub(crate) fn unreachable(mut self, name: &str) -> Self {
        self.unreachable.insert(name.to_string());
        self
    }

    /// Successful connects so far
    pub(crate) fn connect_count(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.connects)
    }

    /// While set, the server's transports are dead and connects are refused
    pub(crate) fn kill_switch(&self, name: &str) -> Arc<AtomicBool> {
        Arc::clone(&self.handle(name).killed)
    }

    /// Names of tools called on the server, in call order
    pub(crate) fn calls(&self, name: &str) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.handle(name).calls)
    }

    /// Signalled whenever a tool call reaches the server
    pub(crate) fn call_started(&self, name: &str) -> Arc<Notify> {
        Arc::clone(&self.handle(name).call_started)
    }

    /// Calls whose caller went away before the server answered
    pub(crate) fn abandoned(&self, name: &str) -> Arc<AtomicUsize> {
        Arc::clone(&self.handle(name).abandoned)
    }

    fn handle(&self, name: &str) -> &ServerHandle {
        match self.servers.get(name) {
            Some(handle) => handle,
            None => panic!("no fake server named {}", name),
        }
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, server: &ServerDescriptor) -> Result<Box<dyn McpTransport>> {
        if self.unreachable.contains(&server.name) {
            return Err(anyhow!("connection refused"));
        }
        let handle = self
            .servers
            .get(&server.name)
            .ok_or_else(|| anyhow!("no such server"))?;
        if handle.killed.load(Ordering::SeqCst) {
            return Err(anyhow!("connection refused"));
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeTransport {
            handle: handle.clone(),
        }))
    }
}

struct FakeTransport {
    handle: ServerHandle,
}

#[async_trait]
impl McpTransport for FakeTransport {
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        if self.handle.killed.load(Ordering::SeqCst) {
            return Err(anyhow!("broken pipe"));
        }
        let script = &self.handle.script;
        match method {
            "initialize" => Ok(json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {"tools": {}},
                "serverInfo": {"name": "fake", "version": "0.0.0"}
            })),
            "tools/list" => Ok(json!({ "tools": script.tools })),
            "tools/call" => {
                let params = params.unwrap_or_default();
                let name = params["name"].as_str().unwrap_or_default().to_string();
                self.handle.calls.lock().push(name.clone());
                self.handle.call_started.notify_one();
                if script.hanging.contains(&name) {
                    let _guard = AbandonGuard(Arc::clone(&self.handle.abandoned));
                    std::future::pending::<()>().await;
                }
                if let Some(delay) = script.delays.get(&name) {
                    tokio::time::sleep(*delay).await;
                }
                if script.failing.contains(&name) {
                    return Err(anyhow!("MCP error -32000: {} crashed", name));
                }
                Ok(json!({"content": [{"type": "text", "text": format!("{} ok", name)}]}))
            }
            other => Err(anyhow!("MCP error -32601: unknown method {}", other)),
        }
    }

    async fn notify(&self, _method: &str, _params: Option<Value>) -> Result<()> {
        Ok(())
    }

    async fn is_alive(&self) -> bool {
        !self.handle.killed.load(Ordering::SeqCst)
    }
}

/// Counts a hanging call as abandoned when its future is dropped
struct AbandonGuard(Arc<AtomicUsize>);

impl Drop for AbandonGuard {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}
