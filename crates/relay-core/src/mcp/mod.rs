//! MCP (Model Context Protocol) tool servers
//!
//! Configuration, transports, the per-server client, the schema bridge and
//! the pool that owns every connection.

pub mod bridge;
pub mod client;
pub mod config;
pub mod pool;
pub mod protocol;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use bridge::{ToolCatalog, ToolCollision};
pub use client::McpClient;
pub use config::{load_servers, ServerDescriptor, TransportKind};
pub use pool::{Connector, DefaultConnector, ServerStatus, ToolServerPool};
pub use protocol::{McpToolDef, McpToolResult};
pub use transport::McpTransport;
