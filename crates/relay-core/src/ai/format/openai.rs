//! OpenAI API format handler
//!
//! Chat/completions request bodies and non-streaming response parsing.

use anyhow::{anyhow, Result};
use serde_json::{json, Value};

use super::{output_to_string, parse_arguments, FormatHandler, RequestOptions};
use crate::ai::types::{AiTool, AiToolCall, Content, FinishReason, LlmResponse, ModelMessage, Role, Usage};

/// OpenAI chat/completions format handler
pub struct OpenAIFormat;

impl FormatHandler for OpenAIFormat {
    /// Tool results travel as separate `role: tool` messages; assistant tool
    /// calls are nested under `tool_calls` with stringified arguments.
    fn convert_messages(&self, messages: &[ModelMessage]) -> Vec<Value> {
        let mut result = Vec::new();

        for msg in messages {
            let has_tool_results = msg
                .content
                .iter()
                .any(|c| matches!(c, Content::ToolResult { .. }));

            if has_tool_results {
                for content in &msg.content {
                    if let Content::ToolResult {
                        tool_use_id,
                        output,
                        ..
                    } = content
                    {
                        result.push(json!({
                            "role": "tool",
                            "tool_call_id": tool_use_id,
                            "content": output_to_string(output)
                        }));
                    }
                }
                continue;
            }

            match msg.role {
                Role::Assistant => {
                    let mut tool_calls = Vec::new();
                    for content in &msg.content {
                        if let Content::ToolUse { id, name, input } = content {
                            tool_calls.push(json!({
                                "id": id,
                                "type": "function",
                                "function": {
                                    "name": name,
                                    "arguments": input.to_string()
                                }
                            }));
                        }
                    }

                    let text = msg.text();
                    let mut msg_obj = json!({ "role": "assistant" });
                    if !text.is_empty() || tool_calls.is_empty() {
                        msg_obj["content"] = json!(text);
                    }
                    if !tool_calls.is_empty() {
                        msg_obj["tool_calls"] = json!(tool_calls);
                    }
                    result.push(msg_obj);
                }
                Role::User => {
                    result.push(json!({
                        "role": "user",
                        "content": msg.text()
                    }));
                }
            }
        }

        result
    }

    fn convert_tools(&self, tools: &[AiTool]) -> Vec<Value> {
        tools
            .iter()
            .map(|tool| {
                json!({
                    "type": "function",
                    "function": {
                        "name": tool.name,
                        "description": tool.description,
                        "parameters": tool.input_schema
                    }
                })
            })
            .collect()
    }

    fn build_request_body(
        &self,
        model: &str,
        mut messages: Vec<Value>,
        options: &RequestOptions<'_>,
    ) -> Value {
        if let Some(system) = options.system_prompt {
            messages.insert(0, json!({ "role": "system", "content": system }));
        }

        let mut body = json!({
            "model": model,
            "messages": messages,
            "max_tokens": options.max_tokens,
        });

        if !options.tools.is_empty() {
            body["tools"] = json!(self.convert_tools(options.tools));
        }

        body
    }

    fn parse_response(&self, json: &Value) -> Result<LlmResponse> {
        let choice = json
            .get("choices")
            .and_then(|c| c.get(0))
            .ok_or_else(|| anyhow!("response has no choices"))?;
        let message = choice
            .get("message")
            .ok_or_else(|| anyhow!("choice has no message"))?;

        let text = message
            .get("content")
            .and_then(|c| c.as_str())
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(ToString::to_string);

        let mut tool_calls = Vec::new();
        if let Some(calls) = message.get("tool_calls").and_then(|c| c.as_array()) {
            for (idx, call) in calls.iter().enumerate() {
                let Some(function) = call.get("function") else {
                    continue;
                };
                let name = function
                    .get("name")
                    .and_then(|n| n.as_str())
                    .unwrap_or_default();
                if name.is_empty() {
                    continue;
                }
                let id = call
                    .get("id")
                    .and_then(|i| i.as_str())
                    .map(ToString::to_string)
                    .unwrap_or_else(|| format!("call_{}", idx));
                let arguments = match function.get("arguments") {
                    Some(Value::String(raw)) => parse_arguments(raw),
                    Some(other) => other.clone(),
                    None => Value::Object(Default::default()),
                };
                tool_calls.push(AiToolCall {
                    id,
                    name: name.to_string(),
                    arguments,
                });
            }
        }

        let finish_reason = choice
            .get("finish_reason")
            .and_then(|r| r.as_str())
            .map(FinishReason::from_provider);

        let usage = json
            .get("usage")
            .map(|u| Usage {
                prompt_tokens: u.get("prompt_tokens").and_then(|v| v.as_u64()).unwrap_or(0) as usize,
                completion_tokens: u
                    .get("completion_tokens")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0) as usize,
            })
            .unwrap_or_default();

        Ok(LlmResponse {
            text,
            tool_calls,
            finish_reason,
            usage,
        })
    }
}
