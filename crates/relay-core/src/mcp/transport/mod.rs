//! Transports carrying JSON-RPC between the pool and a tool server

mod http;
mod stdio;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

pub use http::HttpTransport;
pub use stdio::StdioTransport;

/// A live channel to one tool server.
///
/// `request` resolves with the response's `result` payload; a JSON-RPC error
/// or a broken channel is an `Err`. Dropping a pending `request` future
/// abandons that request.
#[async_trait]
pub trait McpTransport: Send + Sync {
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value>;

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<()>;

    /// False once the channel is known to be broken
    async fn is_alive(&self) -> bool;
}
