//! The two workflow nodes: one LLM call, one batch of tool calls

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

use super::context::RunContext;
use super::executor::execute_calls;
use super::loop_events::LoopEvent;
use crate::ai::types::{Content, LlmRequest, ModelMessage, Role};
use crate::error::{AgentError, AgentResult};
use crate::graph::Node;
use crate::state::{AgentOutcome, ConversationState, StateUpdate};

/// Calls the LLM with the conversation so far
pub struct LlmNode;

impl LlmNode {
    pub fn request(state: &ConversationState) -> LlmRequest {
        let mut system = state.system_instructions().unwrap_or_default().to_string();
        if let Some(app_state) = state.application_state().filter(|s| !s.trim().is_empty()) {
            if !system.is_empty() {
                system.push_str("\n\n");
            }
            system.push_str("Current application state:\n");
            system.push_str(app_state);
        }
        LlmRequest {
            system: (!system.is_empty()).then_some(system),
            messages: state.chat_history().to_vec(),
            tools: state.available_tools().to_vec(),
        }
    }
}

#[async_trait]
impl Node<RunContext> for LlmNode {
    async fn run(&self, state: &ConversationState, run: &RunContext) -> AgentResult<StateUpdate> {
        let request = Self::request(state);
        let timeout = run.agent.config.timeouts.llm_timeout();

        let failure = match tokio::time::timeout(timeout, run.agent.llm.complete(request)).await {
            Ok(Ok(response)) => {
                let text = response.text.filter(|t| !t.trim().is_empty());
                info!(
                    tool_calls = response.tool_calls.len(),
                    has_text = text.is_some(),
                    "LLM responded"
                );
                if let Some(text) = &text {
                    run.events.emit(LoopEvent::Message { text: text.clone() });
                }

                let message = ModelMessage::assistant(text.as_deref(), &response.tool_calls);
                let mut update = StateUpdate::new();
                if !message.content.is_empty() {
                    update = update.append_history(vec![message]);
                }
                return Ok(update.append_outcome(AgentOutcome::Response {
                    text,
                    tool_calls: response.tool_calls,
                }));
            }
            Ok(Err(e)) => AgentError::LlmCallFailed(e.to_string()),
            Err(_) => AgentError::timeout("LLM call", timeout),
        };

        let description = failure.to_string();
        warn!(%description, "LLM step failed");
        run.events.emit(LoopEvent::error(description.clone()));
        Ok(StateUpdate::new()
            .error_count(state.error_count() + 1)
            .append_outcome(AgentOutcome::Failure { description }))
    }
}

/// Executes the tool calls of the latest LLM response
pub struct ToolNode;

#[async_trait]
impl Node<RunContext> for ToolNode {
    async fn run(&self, state: &ConversationState, run: &RunContext) -> AgentResult<StateUpdate> {
        let calls = state
            .last_outcome()
            .map(|o| o.pending_tool_calls().to_vec())
            .unwrap_or_default();
        for call in &calls {
            run.events.emit(LoopEvent::ToolCalled {
                tool_name: call.name.clone(),
            });
        }

        let results = execute_calls(&calls, run).await;

        let mut failures = 0;
        let mut content = Vec::with_capacity(results.len());
        let mut outcomes = Vec::with_capacity(results.len());
        for result in results {
            if let Some(failure) = result.failure {
                failures += 1;
                run.events.emit(LoopEvent::error(failure.to_string()));
            }
            let outcome = result.outcome;
            content.push(Content::ToolResult {
                tool_use_id: outcome.call_id.clone(),
                output: Value::String(outcome.output.clone()),
                is_error: outcome.is_error.then_some(true),
            });
            outcomes.push(outcome);
        }

        let mut update = StateUpdate::new();
        if !content.is_empty() {
            update = update.append_history(vec![ModelMessage {
                role: Role::User,
                content,
            }]);
        }
        if failures > 0 {
            update = update.error_count(state.error_count() + failures);
        }
        Ok(update.append_outcome(AgentOutcome::ToolResults { results: outcomes }))
    }
}
