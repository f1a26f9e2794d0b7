//! Anthropic API format handler
//!
//! Handles message alternation and tool conversion for the Anthropic
//! Messages API.

use anyhow::{anyhow, Result};
use serde_json::{json, Value};
use tracing::debug;

use super::{output_to_string, FormatHandler, RequestOptions};
use crate::ai::types::{AiTool, AiToolCall, Content, FinishReason, LlmResponse, ModelMessage, Role, Usage};

/// Anthropic messages format handler
pub struct AnthropicFormat;

impl FormatHandler for AnthropicFormat {
    /// The API requires user/assistant messages to strictly alternate. A
    /// failed LLM call leaves two user turns back to back, so a filler
    /// assistant message is inserted between them.
    fn convert_messages(&self, messages: &[ModelMessage]) -> Vec<Value> {
        let mut result: Vec<Value> = Vec::new();
        let mut last_role: Option<&str> = None;

        for msg in messages {
            let role = match msg.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            };

            if last_role == Some(role) {
                let filler = if role == "user" { "assistant" } else { "user" };
                debug!("Inserting filler {} message to maintain alternation", filler);
                result.push(json!({
                    "role": filler,
                    "content": [{ "type": "text", "text": "." }]
                }));
            }

            let content: Vec<Value> = msg.content.iter().map(convert_content).collect();
            result.push(json!({ "role": role, "content": content }));
            last_role = Some(role);
        }

        result
    }

    fn convert_tools(&self, tools: &[AiTool]) -> Vec<Value> {
        tools
            .iter()
            .map(|tool| {
                json!({
                    "name": tool.name,
                    "description": tool.description,
                    "input_schema": tool.input_schema,
                })
            })
            .collect()
    }

    fn build_request_body(
        &self,
        model: &str,
        messages: Vec<Value>,
        options: &RequestOptions<'_>,
    ) -> Value {
        let mut body = json!({
            "model": model,
            "messages": messages,
            "max_tokens": options.max_tokens,
        });

        if let Some(system) = options.system_prompt {
            body["system"] = json!(system);
        }

        if !options.tools.is_empty() {
            body["tools"] = json!(self.convert_tools(options.tools));
        }

        body
    }

    fn parse_response(&self, json: &Value) -> Result<LlmResponse> {
        let blocks = json
            .get("content")
            .and_then(|c| c.as_array())
            .ok_or_else(|| anyhow!("response has no content array"))?;

        let mut text = String::new();
        let mut tool_calls = Vec::new();

        for block in blocks {
            match block.get("type").and_then(|t| t.as_str()) {
                Some("text") => {
                    if let Some(chunk) = block.get("text").and_then(|t| t.as_str()) {
                        text.push_str(chunk);
                    }
                }
                Some("tool_use") => {
                    let id = block.get("id").and_then(|i| i.as_str()).unwrap_or_default();
                    let name = block.get("name").and_then(|n| n.as_str()).unwrap_or_default();
                    if name.is_empty() {
                        continue;
                    }
                    tool_calls.push(AiToolCall {
                        id: id.to_string(),
                        name: name.to_string(),
                        arguments: block
                            .get("input")
                            .cloned()
                            .unwrap_or_else(|| Value::Object(Default::default())),
                    });
                }
                // Thinking and other block kinds carry nothing the loop needs
                _ => {}
            }
        }

        let text = text.trim();
        let usage = json
            .get("usage")
            .map(|u| Usage {
                prompt_tokens: u.get("input_tokens").and_then(|v| v.as_u64()).unwrap_or(0) as usize,
                completion_tokens: u.get("output_tokens").and_then(|v| v.as_u64()).unwrap_or(0)
                    as usize,
            })
            .unwrap_or_default();

        Ok(LlmResponse {
            text: (!text.is_empty()).then(|| text.to_string()),
            tool_calls,
            finish_reason: json
                .get("stop_reason")
                .and_then(|r| r.as_str())
                .map(FinishReason::from_provider),
            usage,
        })
    }
}

fn convert_content(content: &Content) -> Value {
    match content {
        Content::Text { text } => json!({ "type": "text", "text": text }),
        Content::ToolUse { id, name, input } => json!({
            "type": "tool_use",
            "id": id,
            "name": name,
            "input": input
        }),
        Content::ToolResult {
            tool_use_id,
            output,
            is_error,
        } => {
            let mut block = json!({
                "type": "tool_result",
                "tool_use_id": tool_use_id,
                "content": output_to_string(output)
            });
            if *is_error == Some(true) {
                block["is_error"] = json!(true);
            }
            block
        }
    }
}
