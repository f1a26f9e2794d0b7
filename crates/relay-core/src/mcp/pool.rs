//! Tool-server pool
//!
//! One entry per configured server. Each entry serializes its own connection
//! transitions behind an async mutex, so a slow or dead server never blocks
//! the others. Connections are shared by every session in the process.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::bridge::{self, ToolCatalog};
use super::client::McpClient;
use super::config::{ServerDescriptor, TransportKind};
use super::protocol::{McpToolDef, McpToolResult};
use super::transport::{HttpTransport, McpTransport, StdioTransport};
use crate::config::Timeouts;
use crate::error::{AgentError, AgentResult};

/// Builds the transport for a server
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, server: &ServerDescriptor) -> Result<Box<dyn McpTransport>>;
}

/// Stdio servers are spawned, http(s) servers get an HTTP session
pub struct DefaultConnector {
    timeouts: Timeouts,
}

impl DefaultConnector {
    pub fn new(timeouts: Timeouts) -> Self {
        Self { timeouts }
    }
}

#[async_trait]
impl Connector for DefaultConnector {
    async fn connect(&self, server: &ServerDescriptor) -> Result<Box<dyn McpTransport>> {
        Ok(match server.transport {
            TransportKind::Stdio => Box::new(StdioTransport::spawn(server)?),
            TransportKind::Http | TransportKind::Https => Box::new(HttpTransport::new(
                server,
                self.timeouts.connect_timeout(),
            )?),
        })
    }
}

/// Observable state of one server
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ServerStatus {
    Disconnected,
    Connected { tools: usize },
    Unavailable { reason: String },
}

enum Connection {
    Disconnected,
    Connected(Arc<McpClient>),
    Unavailable(String),
}

struct PoolEntry {
    descriptor: ServerDescriptor,
    connection: Mutex<Connection>,
    /// Readable without the connection lock; kept in step with `connection`
    status: RwLock<ServerStatus>,
    tools: RwLock<Vec<McpToolDef>>,
}

impl PoolEntry {
    fn name(&self) -> &str {
        &self.descriptor.name
    }

    fn mark_connected(&self, conn: &mut Connection, client: Arc<McpClient>) {
        let tools = client.cached_tools();
        *self.status.write() = ServerStatus::Connected { tools: tools.len() };
        *self.tools.write() = tools;
        *conn = Connection::Connected(client);
    }

    fn mark_unavailable(&self, conn: &mut Connection, reason: String) {
        *self.status.write() = ServerStatus::Unavailable {
            reason: reason.clone(),
        };
        self.tools.write().clear();
        *conn = Connection::Unavailable(reason);
    }
}

pub struct ToolServerPool {
    entries: Vec<PoolEntry>,
    connector: Arc<dyn Connector>,
    timeouts: Timeouts,
    routes: RwLock<HashMap<String, String>>,
}

impl ToolServerPool {
    pub fn new(
        servers: Vec<ServerDescriptor>,
        connector: Arc<dyn Connector>,
        timeouts: Timeouts,
    ) -> Self {
        let entries = servers
            .into_iter()
            .map(|descriptor| PoolEntry {
                descriptor,
                connection: Mutex::new(Connection::Disconnected),
                status: RwLock::new(ServerStatus::Disconnected),
                tools: RwLock::new(Vec::new()),
            })
            .collect();
        Self {
            entries,
            connector,
            timeouts,
            routes: RwLock::new(HashMap::new()),
        }
    }

    /// Pool that spawns/dials real servers
    pub fn with_default_connector(servers: Vec<ServerDescriptor>, timeouts: Timeouts) -> Self {
        Self::new(servers, Arc::new(DefaultConnector::new(timeouts)), timeouts)
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &ServerDescriptor> {
        self.entries.iter().map(|e| &e.descriptor)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry(&self, name: &str) -> Option<&PoolEntry> {
        self.entries.iter().find(|e| e.name() == name)
    }

    /// Connect one server. Connecting a live server is a no-op.
    pub async fn connect(&self, name: &str) -> AgentResult<()> {
        let entry = self.entry(name).ok_or_else(|| AgentError::ConnectionFailed {
            server: name.to_string(),
            cause: "server is not configured".to_string(),
        })?;
        self.ensure_connected(entry)
            .await
            .map(|_| ())
            .map_err(|cause| AgentError::ConnectionFailed {
                server: name.to_string(),
                cause,
            })
    }

    /// Connect every server concurrently. One failure never affects another.
    pub async fn connect_all(&self) -> Vec<(String, AgentResult<()>)> {
        let attempts = self.entries.iter().map(|entry| async move {
            (entry.name().to_string(), self.connect(entry.name()).await)
        });
        let results = join_all(attempts).await;
        let connected = results.iter().filter(|(_, r)| r.is_ok()).count();
        info!(
            connected,
            configured = self.entries.len(),
            "Tool server connection pass complete"
        );
        results
    }

    /// Live client for `entry`, making one connection attempt if needed.
    ///
    /// The entry lock is held for the whole attempt: a single writer per server.
    async fn ensure_connected(&self, entry: &PoolEntry) -> Result<Arc<McpClient>, String> {
        let mut conn = entry.connection.lock().await;
        if let Connection::Connected(client) = &*conn {
            if client.is_alive().await {
                return Ok(Arc::clone(client));
            }
            warn!(server = %entry.name(), "Connection lost, reconnecting");
        } else if let Connection::Unavailable(reason) = &*conn {
            debug!(server = %entry.name(), %reason, "Retrying unavailable server");
        }

        match self.establish(&entry.descriptor).await {
            Ok(client) => {
                let client = Arc::new(client);
                entry.mark_connected(&mut conn, Arc::clone(&client));
                info!(server = %entry.name(), transport = %entry.descriptor.transport, "Tool server connected");
                Ok(client)
            }
            Err(cause) => {
                warn!(server = %entry.name(), %cause, "Tool server unavailable");
                entry.mark_unavailable(&mut conn, cause.clone());
                Err(cause)
            }
        }
    }

    async fn establish(&self, server: &ServerDescriptor) -> Result<McpClient, String> {
        let connect = self.timeouts.connect_timeout();
        let transport = tokio::time::timeout(connect, self.connector.connect(server))
            .await
            .map_err(|_| AgentError::timeout("connect", connect).to_string())?
            .map_err(|e| format!("{:#}", e))?;

        let client = McpClient::new(&server.name, &server.client_name, transport);
        tokio::time::timeout(connect, client.initialize())
            .await
            .map_err(|_| AgentError::timeout("initialize", connect).to_string())?
            .map_err(|e| format!("{:#}", e))?;

        let list = self.timeouts.list_tools_timeout();
        tokio::time::timeout(list, client.list_tools())
            .await
            .map_err(|_| AgentError::timeout("tools/list", list).to_string())?
            .map_err(|e| format!("{:#}", e))?;
        Ok(client)
    }

    /// Current tools of one server, fetched fresh from it
    pub async fn list_tools(&self, name: &str) -> AgentResult<Vec<McpToolDef>> {
        let unavailable = |reason: String| AgentError::ToolListUnavailable {
            server: name.to_string(),
            reason,
        };
        let entry = self
            .entry(name)
            .ok_or_else(|| unavailable("server is not configured".to_string()))?;
        let client = self.ensure_connected(entry).await.map_err(unavailable)?;

        let timeout = self.timeouts.list_tools_timeout();
        let tools = match tokio::time::timeout(timeout, client.list_tools()).await {
            Ok(Ok(tools)) => tools,
            Ok(Err(e)) => return Err(unavailable(format!("{:#}", e))),
            Err(_) => return Err(unavailable(AgentError::timeout("tools/list", timeout).to_string())),
        };
        *entry.status.write() = ServerStatus::Connected { tools: tools.len() };
        *entry.tools.write() = tools.clone();
        Ok(tools)
    }

    /// Aggregate the tools of all connected servers and refresh routing
    pub fn aggregate(&self) -> ToolCatalog {
        let snapshots: Vec<(&str, Vec<McpToolDef>)> = self
            .entries
            .iter()
            .filter(|e| matches!(*e.status.read(), ServerStatus::Connected { .. }))
            .map(|e| (e.name(), e.tools.read().clone()))
            .collect();
        let catalog = bridge::aggregate(
            snapshots
                .iter()
                .map(|(name, tools)| (*name, tools.as_slice())),
        );
        *self.routes.write() = catalog.routes.clone();
        catalog
    }

    /// Owner of `tool` per the last aggregation
    pub fn route(&self, tool: &str) -> Option<String> {
        self.routes.read().get(tool).cloned()
    }

    /// Route a tool call to its owning server
    pub async fn invoke(&self, tool: &str, arguments: Value) -> AgentResult<McpToolResult> {
        let server = self
            .route(tool)
            .ok_or_else(|| AgentError::UnknownTool(tool.to_string()))?;
        let failed = |cause: String| AgentError::ToolInvocationFailed {
            server: server.clone(),
            cause,
        };
        let entry = self
            .entry(&server)
            .ok_or_else(|| failed("server is not configured".to_string()))?;
        let client = self.ensure_connected(entry).await.map_err(failed)?;

        let timeout = self.timeouts.invoke_timeout();
        debug!(server = %server, tool, "Invoking tool");
        match tokio::time::timeout(timeout, client.call_tool(tool, arguments)).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(e)) => {
                if !client.is_alive().await {
                    let mut conn = entry.connection.lock().await;
                    if matches!(&*conn, Connection::Connected(c) if Arc::ptr_eq(c, &client)) {
                        entry.mark_unavailable(&mut conn, format!("{:#}", e));
                    }
                }
                Err(failed(format!("{:#}", e)))
            }
            Err(_) => Err(AgentError::timeout(format!("tool '{}'", tool), timeout)),
        }
    }

    /// Drop the connection to one server
    pub async fn disconnect(&self, name: &str) {
        if let Some(entry) = self.entry(name) {
            let mut conn = entry.connection.lock().await;
            *conn = Connection::Disconnected;
            *entry.status.write() = ServerStatus::Disconnected;
            entry.tools.write().clear();
            info!(server = %name, "Tool server disconnected");
        }
    }

    pub async fn disconnect_all(&self) {
        for entry in &self.entries {
            self.disconnect(entry.name()).await;
        }
    }

    pub fn statuses(&self) -> Vec<(String, ServerStatus)> {
        self.entries
            .iter()
            .map(|e| (e.name().to_string(), e.status.read().clone()))
            .collect()
    }

    pub fn status(&self, name: &str) -> Option<ServerStatus> {
        self.entry(name).map(|e| e.status.read().clone())
    }
}
