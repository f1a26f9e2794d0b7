//! MCP wire format (JSON-RPC 2.0)

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outbound request
#[derive(Debug, Serialize)]
pub struct McpRequest<'a> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl<'a> McpRequest<'a> {
    pub fn new(id: u64, method: &'a str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method,
            params,
        }
    }
}

/// Outbound notification (no id, no reply)
#[derive(Debug, Serialize)]
pub struct McpNotification<'a> {
    pub jsonrpc: &'static str,
    pub method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl<'a> McpNotification<'a> {
    pub fn new(method: &'a str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            method,
            params,
        }
    }
}

/// Any inbound message: a response to one of our requests, or a
/// server-initiated notification/request
#[derive(Debug, Deserialize)]
pub struct McpMessage {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<McpErrorObject>,
    #[serde(default)]
    pub method: Option<String>,
}

impl McpMessage {
    /// Id of the request this message answers, if it is a response
    pub fn response_id(&self) -> Option<u64> {
        if self.method.is_some() {
            return None;
        }
        self.id.as_ref().and_then(Value::as_u64)
    }

    /// The `result` payload, or the JSON-RPC error as an `Err`
    pub fn into_result(self) -> Result<Value> {
        match self.error {
            Some(error) => Err(anyhow!("MCP error {}: {}", error.code, error.message)),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct McpErrorObject {
    pub code: i64,
    pub message: String,
}

/// Tool descriptor as advertised by `tools/list`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpToolDef {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "inputSchema", default = "empty_object_schema")]
    pub input_schema: Value,
}

fn empty_object_schema() -> Value {
    serde_json::json!({"type": "object", "properties": {}})
}

#[derive(Debug, Deserialize)]
pub struct ToolsListResult {
    pub tools: Vec<McpToolDef>,
}

#[derive(Debug, Serialize)]
pub struct ToolCallParams<'a> {
    pub name: &'a str,
    pub arguments: Value,
}

/// Result of `tools/call`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpToolResult {
    #[serde(default)]
    pub content: Vec<McpContent>,
    #[serde(default)]
    pub is_error: bool,
}

impl McpToolResult {
    /// All content blocks rendered as text, one per line
    pub fn text(&self) -> String {
        self.content
            .iter()
            .map(McpContent::render)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum McpContent {
    Text {
        text: String,
    },
    Image {
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    Resource {
        resource: Value,
    },
    #[serde(other)]
    Unsupported,
}

impl McpContent {
    fn render(&self) -> String {
        match self {
            McpContent::Text { text } => text.clone(),
            McpContent::Image { mime_type } => format!("[image: {}]", mime_type),
            McpContent::Resource { resource } => resource
                .get("text")
                .and_then(Value::as_str)
                .or_else(|| resource.get("uri").and_then(Value::as_str))
                .unwrap_or("[resource]")
                .to_string(),
            McpContent::Unsupported => "[unsupported content]".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams<'a> {
    pub protocol_version: &'a str,
    pub capabilities: Value,
    pub client_info: ClientInfo<'a>,
}

#[derive(Debug, Serialize)]
pub struct ClientInfo<'a> {
    pub name: &'a str,
    pub version: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    pub protocol_version: String,
    #[serde(default)]
    pub server_info: Option<ServerInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
}

/// Messages carried in a `text/event-stream` body.
///
/// Each event's `data:` lines are joined and parsed as one JSON-RPC message;
/// events that are not JSON are skipped.
pub fn parse_sse_messages(body: &str) -> Vec<McpMessage> {
    let mut messages = Vec::new();
    for event in body.replace("\r\n", "\n").split("\n\n") {
        let data: Vec<&str> = event
            .lines()
            .filter_map(|line| line.strip_prefix("data:"))
            .map(str::trim_start)
            .collect();
        if data.is_empty() {
            continue;
        }
        match serde_json::from_str::<McpMessage>(&data.join("\n")) {
            Ok(message) => messages.push(message),
            Err(e) => tracing::debug!("Skipping non-JSON SSE event: {}", e),
        }
    }
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_serializes_without_empty_params() {
        let text = serde_json::to_string(&McpRequest::new(7, "tools/list", None)).unwrap();
        assert_eq!(text, r#"{"jsonrpc":"2.0","id":7,"method":"tools/list"}"#);
    }

    #[test]
    fn error_response_becomes_err() {
        let message: McpMessage = serde_json::from_value(json!({
            "jsonrpc": "2.0", "id": 3, "error": {"code": -32601, "message": "no such method"}
        }))
        .unwrap();
        assert_eq!(message.response_id(), Some(3));
        let err = message.into_result().unwrap_err();
        assert!(err.to_string().contains("no such method"));
    }

    #[test]
    fn server_requests_are_not_responses() {
        let message: McpMessage = serde_json::from_value(json!({
            "jsonrpc": "2.0", "id": 1, "method": "roots/list"
        }))
        .unwrap();
        assert_eq!(message.response_id(), None);
    }

    #[test]
    fn tool_result_renders_all_blocks() {
        let result: McpToolResult = serde_json::from_value(json!({
            "content": [
                {"type": "text", "text": "opened"},
                {"type": "image", "data": "AAAA", "mimeType": "image/png"},
                {"type": "audio", "data": "AAAA"}
            ]
        }))
        .unwrap();
        assert!(!result.is_error);
        assert_eq!(result.text(), "opened\n[image: image/png]\n[unsupported content]");
    }

    #[test]
    fn tool_def_without_schema_gets_empty_object() {
        let def: McpToolDef = serde_json::from_value(json!({"name": "ping"})).unwrap();
        assert_eq!(def.input_schema["type"], "object");
    }

    #[test]
    fn sse_body_yields_json_events() {
        let body = "event: message\r\ndata: {\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}\r\n\r\n\
                    : keep-alive\n\n\
                    data: not json\n\n";
        let messages = parse_sse_messages(body);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].response_id(), Some(1));
    }
}
