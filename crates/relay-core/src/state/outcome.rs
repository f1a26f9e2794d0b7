//! Entries of the `agent_outcome` channel

use serde::{Deserialize, Serialize};

use crate::ai::types::AiToolCall;

/// One step's outcome, appended after every LLM or tool node run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentOutcome {
    /// The LLM answered; non-empty `tool_calls` are pending execution
    Response {
        text: Option<String>,
        tool_calls: Vec<AiToolCall>,
    },
    /// Results of executing the previous response's tool calls, in request order
    ToolResults { results: Vec<ToolOutcome> },
    /// The LLM call failed or timed out
    Failure { description: String },
}

impl AgentOutcome {
    pub fn pending_tool_calls(&self) -> &[AiToolCall] {
        match self {
            AgentOutcome::Response { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, AgentOutcome::Failure { .. })
    }
}

/// Result of a single tool call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub call_id: String,
    pub tool_name: String,
    /// Owning server, when the call was routed
    pub server: Option<String>,
    pub output: String,
    pub is_error: bool,
}
