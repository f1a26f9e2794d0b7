//! Tool execution for the tool node.
//!
//! Calls run concurrently; results come back in request order. `ask_user`
//! is answered by the session's next message instead of a server.

use futures::future::join_all;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::context::RunContext;
use super::loop_events::LoopEvent;
use crate::ai::types::{AiTool, AiToolCall};
use crate::constants::agent::{ASK_USER_TOOL, MAX_TOOL_OUTPUT_CHARS};
use crate::error::AgentError;
use crate::state::ToolOutcome;

/// Result of one call plus the failure to count, if it failed
pub(crate) struct CallResult {
    pub outcome: ToolOutcome,
    pub failure: Option<AgentError>,
}

/// Execute a batch of tool calls, results in request order
pub(crate) async fn execute_calls(calls: &[AiToolCall], run: &RunContext) -> Vec<CallResult> {
    join_all(calls.iter().map(|call| execute_call(call, run))).await
}

async fn execute_call(call: &AiToolCall, run: &RunContext) -> CallResult {
    if call.name == ASK_USER_TOOL {
        return ask_user(call, run).await;
    }

    let pool = &run.agent.pool;
    let server = pool.route(&call.name);
    match pool.invoke(&call.name, call.arguments.clone()).await {
        Ok(result) => {
            debug!(tool = %call.name, is_error = result.is_error, "Tool returned");
            CallResult {
                outcome: ToolOutcome {
                    call_id: call.id.clone(),
                    tool_name: call.name.clone(),
                    server,
                    output: truncate_output(&result.text()),
                    is_error: result.is_error,
                },
                failure: None,
            }
        }
        Err(e) => {
            warn!(tool = %call.name, "Tool call failed: {}", e);
            CallResult {
                outcome: ToolOutcome {
                    call_id: call.id.clone(),
                    tool_name: call.name.clone(),
                    server,
                    output: format!("Error: {}", e),
                    is_error: true,
                },
                failure: Some(e),
            }
        }
    }
}

/// Ask the user and wait for the session's next message
async fn ask_user(call: &AiToolCall, run: &RunContext) -> CallResult {
    let question = call
        .arguments
        .get("question")
        .and_then(Value::as_str)
        .filter(|q| !q.trim().is_empty())
        .unwrap_or("The assistant needs more information to continue.")
        .to_string();
    // Messages queued before the question are requests, not answers
    let mark = run.inbox.mark();
    run.events.emit(LoopEvent::UserInputRequested {
        text: question.clone(),
    });
    info!(%question, "Waiting for user input");

    let timeout = run.agent.config.timeouts.user_input_timeout();
    let reply = tokio::time::timeout(timeout, run.inbox.reply_after(mark)).await;

    let (output, is_error, failure) = match reply {
        Ok(Some(message)) => (message.text, false, None),
        Ok(None) => (
            "The session closed before the user replied.".to_string(),
            true,
            None,
        ),
        Err(_) => {
            let err = AgentError::timeout("waiting for user input", timeout);
            (format!("Error: {}", err), true, Some(err))
        }
    };
    CallResult {
        outcome: ToolOutcome {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            server: None,
            output,
            is_error,
        },
        failure,
    }
}

/// Built-in tool offered alongside the servers' tools
pub fn ask_user_tool() -> AiTool {
    AiTool {
        name: ASK_USER_TOOL.to_string(),
        description: "Ask the user a question and wait for their answer. Use only when the \
request cannot be completed without information the user must provide."
            .to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "question": {"type": "string", "description": "The question to show the user"}
            },
            "required": ["question"]
        }),
    }
}

pub(crate) fn truncate_output(output: &str) -> String {
    if output.len() <= MAX_TOOL_OUTPUT_CHARS {
        return output.to_string();
    }

    let cut = floor_char_boundary(output, MAX_TOOL_OUTPUT_CHARS);
    let head = &output[..cut];
    let clean = match head.rfind('\n') {
        Some(newline) => &head[..newline],
        None => head,
    };
    format!(
        "{}\n\n[... output truncated: {} chars -> {} chars ...]",
        clean,
        output.len(),
        clean.len()
    )
}

fn floor_char_boundary(text: &str, index: usize) -> usize {
    let mut boundary = index.min(text.len());
    while boundary > 0 && !text.is_char_boundary(boundary) {
        boundary -= 1;
    }
    boundary
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_output_is_untouched() {
        assert_eq!(truncate_output("opened"), "opened");
    }

    #[test]
    fn long_output_is_cut_at_a_line_break() {
        let line = "x".repeat(99);
        let output = vec![line; 1000].join("\n");
        let truncated = truncate_output(&output);
        assert!(truncated.len() < output.len());
        assert!(truncated.contains("output truncated"));
        let body = truncated.split("\n\n[...").next().unwrap();
        assert!(body.len() <= MAX_TOOL_OUTPUT_CHARS);
        assert!(body.ends_with('x'));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let output = "é".repeat(MAX_TOOL_OUTPUT_CHARS);
        let truncated = truncate_output(&output);
        assert!(truncated.starts_with('é'));
    }

    #[test]
    fn ask_user_schema_requires_question() {
        let tool = ask_user_tool();
        assert_eq!(tool.name, "ask_user");
        assert_eq!(tool.input_schema["required"][0], "question");
    }
}
