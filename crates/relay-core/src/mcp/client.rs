//! MCP client for one server
//!
//! Speaks the handshake and tool calls over whatever transport the pool
//! built for the server.

use anyhow::{Context, Result};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, info};

use super::protocol::{
    ClientInfo, InitializeParams, InitializeResult, McpToolDef, McpToolResult, ToolCallParams,
    ToolsListResult,
};
use super::transport::McpTransport;
use crate::constants::mcp::PROTOCOL_VERSION;

pub struct McpClient {
    name: String,
    client_name: String,
    transport: Box<dyn McpTransport>,
    tools: RwLock<Vec<McpToolDef>>,
}

impl McpClient {
    pub fn new(name: &str, client_name: &str, transport: Box<dyn McpTransport>) -> Self {
        Self {
            name: name.to_string(),
            client_name: client_name.to_string(),
            transport,
            tools: RwLock::new(Vec::new()),
        }
    }

    /// `initialize` followed by `notifications/initialized`
    pub async fn initialize(&self) -> Result<InitializeResult> {
        let params = InitializeParams {
            protocol_version: PROTOCOL_VERSION,
            capabilities: json!({}),
            client_info: ClientInfo {
                name: &self.client_name,
                version: env!("CARGO_PKG_VERSION"),
            },
        };
        let result: InitializeResult = self
            .request("initialize", Some(serde_json::to_value(params)?))
            .await
            .with_context(|| format!("initialize failed for '{}'", self.name))?;

        info!(
            server = %self.name,
            protocol = %result.protocol_version,
            remote = result.server_info.as_ref().map(|i| i.name.as_str()).unwrap_or("unknown"),
            "Tool server initialized"
        );

        self.transport
            .notify("notifications/initialized", None)
            .await?;
        Ok(result)
    }

    /// Fetch the current tool list and cache it
    pub async fn list_tools(&self) -> Result<Vec<McpToolDef>> {
        let result: ToolsListResult = self.request("tools/list", None).await?;
        info!(server = %self.name, tools = result.tools.len(), "Listed tools");
        for tool in &result.tools {
            debug!(server = %self.name, tool = %tool.name, schema = %tool.input_schema, "Tool schema");
        }
        *self.tools.write() = result.tools.clone();
        Ok(result.tools)
    }

    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<McpToolResult> {
        let arguments = if arguments.is_null() {
            json!({})
        } else {
            arguments
        };
        let params = serde_json::to_value(ToolCallParams { name, arguments })?;
        self.request("tools/call", Some(params)).await
    }

    /// Tools from the last successful `list_tools`
    pub fn cached_tools(&self) -> Vec<McpToolDef> {
        self.tools.read().clone()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn is_alive(&self) -> bool {
        self.transport.is_alive().await
    }

    async fn request<R: DeserializeOwned>(&self, method: &str, params: Option<Value>) -> Result<R> {
        debug!(server = %self.name, "Request: {}", method);
        let value = self.transport.request(method, params).await?;
        serde_json::from_value(value)
            .with_context(|| format!("Unexpected {} result from '{}'", method, self.name))
    }
}
