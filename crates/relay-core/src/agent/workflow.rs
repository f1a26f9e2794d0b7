//! The agent's workflow topology
//!
//! ```text
//! START -> llm_node
//! llm_node -> tool_call: tool_node | retry: llm_node | finish: END
//! tool_node -> llm_node
//! ```

use super::context::RunContext;
use super::nodes::{LlmNode, ToolNode};
use crate::error::AgentResult;
use crate::graph::{CompiledGraph, StateGraph, END, START};
use crate::state::{AgentOutcome, ConversationState};

pub const LLM_NODE: &str = "llm_node";
pub const TOOL_NODE: &str = "tool_node";

pub const TOOL_CALL: &str = "tool_call";
pub const RETRY: &str = "retry";
pub const FINISH: &str = "finish";

/// Route after the LLM node from the latest outcome
pub fn route_after_llm(state: &ConversationState) -> String {
    let label = match state.last_outcome() {
        Some(outcome) if !outcome.pending_tool_calls().is_empty() => TOOL_CALL,
        Some(AgentOutcome::Failure { .. }) => RETRY,
        _ => FINISH,
    };
    label.to_string()
}

pub fn build_workflow() -> AgentResult<CompiledGraph<RunContext>> {
    let mut graph = StateGraph::new();
    graph
        .add_node(LLM_NODE, LlmNode)
        .add_node(TOOL_NODE, ToolNode)
        .add_edge(START, LLM_NODE)
        .add_conditional_edges(
            LLM_NODE,
            route_after_llm,
            [(TOOL_CALL, TOOL_NODE), (RETRY, LLM_NODE), (FINISH, END)],
        )
        .add_edge(TOOL_NODE, LLM_NODE);
    graph.compile()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::types::AiToolCall;
    use crate::state::StateUpdate;
    use serde_json::json;

    fn with_outcome(outcome: AgentOutcome) -> ConversationState {
        ConversationState::new()
            .apply(&StateUpdate::new().append_outcome(outcome))
            .unwrap()
    }

    #[test]
    fn workflow_compiles_with_llm_entry() {
        let graph = build_workflow().unwrap();
        assert_eq!(graph.entry(), LLM_NODE);
    }

    #[test]
    fn pending_calls_route_to_tools() {
        let state = with_outcome(AgentOutcome::Response {
            text: None,
            tool_calls: vec![AiToolCall {
                id: "call_1".into(),
                name: "open_url".into(),
                arguments: json!({"url": "https://github.com"}),
            }],
        });
        assert_eq!(route_after_llm(&state), TOOL_CALL);
    }

    #[test]
    fn final_answer_routes_to_finish() {
        let state = with_outcome(AgentOutcome::Response {
            text: Some("Done.".into()),
            tool_calls: vec![],
        });
        assert_eq!(route_after_llm(&state), FINISH);
        assert_eq!(route_after_llm(&ConversationState::new()), FINISH);
    }

    #[test]
    fn failure_routes_to_retry() {
        let state = with_outcome(AgentOutcome::Failure {
            description: "LLM call failed: 503".into(),
        });
        assert_eq!(route_after_llm(&state), RETRY);
    }
}
