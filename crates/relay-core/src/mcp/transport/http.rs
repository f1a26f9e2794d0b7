//! Streamable HTTP transport: one POST per JSON-RPC message to `/mcp`

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::McpTransport;
use crate::constants::mcp::SESSION_HEADER;
use crate::mcp::config::ServerDescriptor;
use crate::mcp::protocol::{parse_sse_messages, McpMessage, McpNotification, McpRequest};

pub struct HttpTransport {
    server: String,
    http: reqwest::Client,
    endpoint: Url,
    streaming: bool,
    session_id: Mutex<Option<String>>,
    next_id: AtomicU64,
    alive: AtomicBool,
}

impl HttpTransport {
    pub fn new(server: &ServerDescriptor, connect_timeout: Duration) -> Result<Self> {
        let endpoint = server.endpoint()?;
        let http = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .context("Failed to build HTTP client")?;
        debug!(server = %server.name, %endpoint, streaming = server.streaming, "HTTP transport ready");
        Ok(Self {
            server: server.name.clone(),
            http,
            endpoint,
            streaming: server.streaming,
            session_id: Mutex::new(None),
            next_id: AtomicU64::new(1),
            alive: AtomicBool::new(true),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn post(&self, body: String) -> Result<reqwest::Response> {
        let accept = if self.streaming {
            "application/json, text/event-stream"
        } else {
            "application/json"
        };
        let mut request = self
            .http
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, accept)
            .body(body);
        if let Some(id) = self.session_id.lock().clone() {
            request = request.header(SESSION_HEADER, id);
        }

        let response = request.send().await.map_err(|e| {
            self.alive.store(false, Ordering::SeqCst);
            anyhow!("POST {} failed: {}", self.endpoint, e)
        })?;
        self.alive.store(true, Ordering::SeqCst);

        if let Some(id) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            *self.session_id.lock() = Some(id.to_string());
        }

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("HTTP {} from '{}': {}", status, self.server, text);
        }
        Ok(response)
    }
}

#[async_trait]
impl McpTransport for HttpTransport {
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let body = serde_json::to_string(&McpRequest::new(id, method, params))?;
        debug!(server = %self.server, "POST [{}] {}", id, method);

        let response = self.post(body).await?;
        let is_sse = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("text/event-stream"));
        let text = response.text().await.context("Failed to read response body")?;

        let message = if is_sse {
            parse_sse_messages(&text)
                .into_iter()
                .find(|m| m.response_id() == Some(id))
                .ok_or_else(|| anyhow!("event stream from '{}' carried no response", self.server))?
        } else {
            serde_json::from_str::<McpMessage>(&text)
                .with_context(|| format!("Invalid JSON-RPC response from '{}'", self.server))?
        };
        message.into_result()
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        let body = serde_json::to_string(&McpNotification::new(method, params))?;
        self.post(body).await.map(|_| ())
    }

    async fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}
