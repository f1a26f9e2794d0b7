//! Single-cursor execution of a compiled graph

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use super::{Edge, Node, END};
use crate::constants;
use crate::error::{AgentError, AgentResult};
use crate::state::{ConversationState, StateUpdate};

/// Caps for one run, counted from the counter values when the run began
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunLimits {
    pub max_iterations: u64,
    pub max_errors: u64,
}

impl Default for RunLimits {
    fn default() -> Self {
        Self {
            max_iterations: constants::agent::MAX_ITERATIONS,
            max_errors: constants::agent::MAX_ERRORS,
        }
    }
}

/// How a run reached END
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// The routing led to END
    Finished,
    /// A cap was reached and END was forced
    Aborted(String),
}

impl Termination {
    /// The abort as an error value, for reporting
    pub fn as_error(&self) -> Option<AgentError> {
        match self {
            Termination::Finished => None,
            Termination::Aborted(reason) => Some(AgentError::LoopAborted(reason.clone())),
        }
    }
}

/// Validated, immutable workflow
pub struct CompiledGraph<C: Send + Sync> {
    entry: String,
    nodes: HashMap<String, Arc<dyn Node<C>>>,
    edges: HashMap<String, Edge>,
}

impl<C: Send + Sync> CompiledGraph<C> {
    pub(super) fn new(
        entry: String,
        nodes: HashMap<String, Arc<dyn Node<C>>>,
        edges: HashMap<String, Edge>,
    ) -> Self {
        Self {
            entry,
            nodes,
            edges,
        }
    }

    /// The node targeted by START; each entry into it is one loop pass
    pub fn entry(&self) -> &str {
        &self.entry
    }

    /// Drive `state` from START until END.
    ///
    /// `state` is replaced after every step, so progress made before a
    /// cancellation or a run-fatal error stays visible to the caller.
    pub async fn run(
        &self,
        state: &mut ConversationState,
        ctx: &C,
        limits: RunLimits,
    ) -> AgentResult<Termination> {
        let base_iterations = state.iteration_count();
        let base_errors = state.error_count();
        let mut cursor = self.entry.clone();

        loop {
            if cursor == END {
                debug!(
                    iterations = state.iteration_count() - base_iterations,
                    "Workflow reached END"
                );
                return Ok(Termination::Finished);
            }

            if cursor == self.entry {
                let passes = state.iteration_count().saturating_sub(base_iterations);
                if passes >= limits.max_iterations {
                    let reason = format!("iteration cap of {} reached", limits.max_iterations);
                    info!(%reason, "Aborting workflow");
                    return Ok(Termination::Aborted(reason));
                }
                let next = state.iteration_count() + 1;
                *state = state.apply(&StateUpdate::new().iteration_count(next))?;
            }

            let node = self
                .nodes
                .get(&cursor)
                .ok_or_else(|| AgentError::GraphInvalid(format!("missing node '{}'", cursor)))?;
            debug!(node = %cursor, iteration = state.iteration_count(), "Running node");
            let update = node.run(state, ctx).await?;
            *state = state.apply(&update)?;

            let errors = state.error_count().saturating_sub(base_errors);
            if errors >= limits.max_errors {
                let reason = format!("error cap of {} reached", limits.max_errors);
                info!(%reason, "Aborting workflow");
                return Ok(Termination::Aborted(reason));
            }

            cursor = self.next_node(&cursor, state)?;
        }
    }

    fn next_node(&self, from: &str, state: &ConversationState) -> AgentResult<String> {
        match self.edges.get(from) {
            Some(Edge::Direct(target)) => Ok(target.clone()),
            Some(Edge::Conditional { predicate, table }) => {
                let label = predicate(state);
                table
                    .get(&label)
                    .cloned()
                    .ok_or_else(|| AgentError::UnknownRouteLabel {
                        node: from.to_string(),
                        label,
                    })
            }
            None => Err(AgentError::GraphInvalid(format!(
                "node '{}' has no outgoing edge",
                from
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::types::ModelMessage;
    use crate::graph::{StateGraph, START};
    use async_trait::async_trait;

    /// Appends one history entry per run
    struct Step;

    #[async_trait]
    impl Node<()> for Step {
        async fn run(&self, state: &ConversationState, _ctx: &()) -> AgentResult<StateUpdate> {
            let n = state.chat_history().len();
            Ok(StateUpdate::new().append_history(vec![ModelMessage::user_text(format!("step {}", n))]))
        }
    }

    /// Records one failure per run
    struct Fail;

    #[async_trait]
    impl Node<()> for Fail {
        async fn run(&self, state: &ConversationState, _ctx: &()) -> AgentResult<StateUpdate> {
            Ok(StateUpdate::new().error_count(state.error_count() + 1))
        }
    }

    fn looping<N: Node<()> + 'static>(node: N, stop_after: usize) -> CompiledGraph<()> {
        let mut graph = StateGraph::new();
        graph.add_node("step", node).add_edge(START, "step").add_conditional_edges(
            "step",
            move |state: &ConversationState| {
                if state.chat_history().len() >= stop_after {
                    "done".to_string()
                } else {
                    "again".to_string()
                }
            },
            [("again", "step"), ("done", END)],
        );
        graph.compile().unwrap()
    }

    #[tokio::test]
    async fn runs_until_end_counting_passes() {
        let graph = looping(Step, 3);
        let mut state = ConversationState::new();
        let result = graph.run(&mut state, &(), RunLimits::default()).await.unwrap();
        assert_eq!(result, Termination::Finished);
        assert_eq!(state.chat_history().len(), 3);
        assert_eq!(state.iteration_count(), 3);
    }

    #[tokio::test]
    async fn iteration_cap_forces_end() {
        let graph = looping(Step, usize::MAX);
        let mut state = ConversationState::new();
        let limits = RunLimits {
            max_iterations: 5,
            max_errors: 3,
        };
        let result = graph.run(&mut state, &(), limits).await.unwrap();
        assert!(matches!(result, Termination::Aborted(ref r) if r.contains("iteration cap")));
        assert_eq!(state.iteration_count(), 5);
        assert_eq!(state.chat_history().len(), 5);
    }

    #[tokio::test]
    async fn error_cap_stops_before_next_node() {
        let graph = looping(Fail, usize::MAX);
        let mut state = ConversationState::new();
        let result = graph.run(&mut state, &(), RunLimits::default()).await.unwrap();
        assert_eq!(
            result.as_error(),
            Some(AgentError::LoopAborted("error cap of 3 reached".to_string()))
        );
        assert_eq!(state.error_count(), 3);
        assert_eq!(state.iteration_count(), 3);
    }

    #[tokio::test]
    async fn caps_are_relative_to_run_start() {
        let graph = looping(Fail, usize::MAX);
        let mut state = ConversationState::new()
            .apply(&StateUpdate::new().error_count(10).iteration_count(40))
            .unwrap();
        graph.run(&mut state, &(), RunLimits::default()).await.unwrap();
        assert_eq!(state.error_count(), 13);
        assert_eq!(state.iteration_count(), 43);
    }

    #[tokio::test]
    async fn unknown_label_is_reported() {
        let mut graph = StateGraph::new();
        graph.add_node("step", Step).add_edge(START, "step").add_conditional_edges(
            "step",
            |_: &ConversationState| "sideways".to_string(),
            [("done", END)],
        );
        let compiled = graph.compile().unwrap();
        let mut state = ConversationState::new();
        let err = compiled
            .run(&mut state, &(), RunLimits::default())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            AgentError::UnknownRouteLabel {
                node: "step".to_string(),
                label: "sideways".to_string()
            }
        );
        assert_eq!(state.chat_history().len(), 1);
    }
}
