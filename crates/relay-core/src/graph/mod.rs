//! Workflow engine
//!
//! A directed graph of named nodes between a synthetic `START` and `END`.
//! `StateGraph` is the builder; `compile` validates the topology once and
//! yields a `CompiledGraph` that can be run any number of times.

mod runner;

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

pub use runner::{CompiledGraph, RunLimits, Termination};

use crate::error::{AgentError, AgentResult};
use crate::state::{ConversationState, StateUpdate};

pub const START: &str = "__start__";
pub const END: &str = "__end__";

/// A unit of workflow execution.
///
/// Recoverable failures belong in the returned update (an outcome entry, a
/// bumped error counter). Returning `Err` aborts the whole run.
#[async_trait]
pub trait Node<C: Send + Sync>: Send + Sync {
    async fn run(&self, state: &ConversationState, ctx: &C) -> AgentResult<StateUpdate>;
}

/// Picks a label from the state after the source node has run
pub type RoutePredicate = Arc<dyn Fn(&ConversationState) -> String + Send + Sync>;

#[derive(Clone)]
pub(crate) enum Edge {
    Direct(String),
    Conditional {
        predicate: RoutePredicate,
        table: BTreeMap<String, String>,
    },
}

impl Edge {
    fn targets(&self) -> Vec<&str> {
        match self {
            Edge::Direct(target) => vec![target.as_str()],
            Edge::Conditional { table, .. } => table.values().map(String::as_str).collect(),
        }
    }
}

/// Graph builder
pub struct StateGraph<C: Send + Sync> {
    nodes: Vec<(String, Arc<dyn Node<C>>)>,
    edges: Vec<(String, Edge)>,
}

impl<C: Send + Sync> Default for StateGraph<C> {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }
}

impl<C: Send + Sync> StateGraph<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, name: impl Into<String>, node: impl Node<C> + 'static) -> &mut Self {
        self.nodes.push((name.into(), Arc::new(node)));
        self
    }

    pub fn add_edge(&mut self, from: impl Into<String>, to: impl Into<String>) -> &mut Self {
        self.edges.push((from.into(), Edge::Direct(to.into())));
        self
    }

    /// Route from `from` by evaluating `predicate` and looking its label up in `table`
    pub fn add_conditional_edges<F, I, L, T>(
        &mut self,
        from: impl Into<String>,
        predicate: F,
        table: I,
    ) -> &mut Self
    where
        F: Fn(&ConversationState) -> String + Send + Sync + 'static,
        I: IntoIterator<Item = (L, T)>,
        L: Into<String>,
        T: Into<String>,
    {
        let table = table
            .into_iter()
            .map(|(label, target)| (label.into(), target.into()))
            .collect();
        self.edges.push((
            from.into(),
            Edge::Conditional {
                predicate: Arc::new(predicate),
                table,
            },
        ));
        self
    }

    /// Validate the topology and freeze it
    pub fn compile(&self) -> AgentResult<CompiledGraph<C>> {
        let mut nodes: HashMap<String, Arc<dyn Node<C>>> = HashMap::new();
        for (name, node) in &self.nodes {
            if name == START || name == END {
                return Err(invalid(format!("'{}' is a reserved node name", name)));
            }
            if nodes.insert(name.clone(), Arc::clone(node)).is_some() {
                return Err(invalid(format!("node '{}' is defined twice", name)));
            }
        }

        let mut edges: HashMap<String, Edge> = HashMap::new();
        for (from, edge) in &self.edges {
            if from == END {
                return Err(invalid("END cannot have outgoing edges"));
            }
            if from != START && !nodes.contains_key(from) {
                return Err(invalid(format!("edge from unknown node '{}'", from)));
            }
            if let Edge::Conditional { table, .. } = edge {
                if table.is_empty() {
                    return Err(invalid(format!(
                        "conditional edge from '{}' has an empty label table",
                        from
                    )));
                }
            }
            for target in edge.targets() {
                if target == START {
                    return Err(invalid(format!("edge from '{}' targets START", from)));
                }
                if target != END && !nodes.contains_key(target) {
                    return Err(invalid(format!(
                        "edge from '{}' targets unknown node '{}'",
                        from, target
                    )));
                }
            }
            if edges.insert(from.clone(), edge.clone()).is_some() {
                let what = if from == START { "START" } else { from.as_str() };
                return Err(invalid(format!("{} has more than one outgoing edge", what)));
            }
        }

        let entry = match edges.remove(START) {
            Some(Edge::Direct(target)) if target != END => target,
            Some(Edge::Direct(_)) => return Err(invalid("START leads directly to END")),
            Some(Edge::Conditional { .. }) => {
                return Err(invalid("START must have a single unconditional edge"))
            }
            None => return Err(invalid("START has no outgoing edge")),
        };

        for name in nodes.keys() {
            if !edges.contains_key(name) {
                return Err(invalid(format!("node '{}' has no outgoing edge", name)));
            }
        }

        let reachable = reachable_from(&entry, &edges);
        if !reachable.contains(END) {
            return Err(invalid("END is unreachable from START"));
        }
        for name in nodes.keys() {
            if !reachable.contains(name.as_str()) {
                warn!(node = %name, "Node is unreachable from START");
            }
        }

        Ok(CompiledGraph::new(entry, nodes, edges))
    }
}

fn invalid(reason: impl Into<String>) -> AgentError {
    AgentError::GraphInvalid(reason.into())
}

fn reachable_from<'a>(entry: &'a str, edges: &'a HashMap<String, Edge>) -> HashSet<&'a str> {
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([entry]);
    while let Some(name) = queue.pop_front() {
        if !seen.insert(name) {
            continue;
        }
        if let Some(edge) = edges.get(name) {
            queue.extend(edge.targets());
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    #[async_trait]
    impl Node<()> for Noop {
        async fn run(&self, _state: &ConversationState, _ctx: &()) -> AgentResult<StateUpdate> {
            Ok(StateUpdate::new())
        }
    }

    fn expect_invalid(graph: &StateGraph<()>, needle: &str) {
        match graph.compile() {
            Err(AgentError::GraphInvalid(reason)) => {
                assert!(reason.contains(needle), "unexpected reason: {}", reason)
            }
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("graph compiled but should not have"),
        }
    }

    #[test]
    fn minimal_loop_compiles() {
        let mut graph = StateGraph::new();
        graph
            .add_node("llm", Noop)
            .add_node("tools", Noop)
            .add_edge(START, "llm")
            .add_conditional_edges(
                "llm",
                |_: &ConversationState| "finish".to_string(),
                [("tool_call", "tools"), ("finish", END)],
            )
            .add_edge("tools", "llm");
        let compiled = graph.compile().unwrap();
        assert_eq!(compiled.entry(), "llm");
    }

    #[test]
    fn rejects_table_naming_missing_node() {
        let mut graph = StateGraph::new();
        graph
            .add_node("llm", Noop)
            .add_edge(START, "llm")
            .add_conditional_edges(
                "llm",
                |_: &ConversationState| "finish".to_string(),
                [("tool_call", "tools"), ("finish", END)],
            );
        expect_invalid(&graph, "unknown node 'tools'");
    }

    #[test]
    fn rejects_unreachable_end() {
        let mut graph = StateGraph::new();
        graph
            .add_node("a", Noop)
            .add_node("b", Noop)
            .add_edge(START, "a")
            .add_edge("a", "b")
            .add_edge("b", "a");
        expect_invalid(&graph, "END is unreachable");
    }

    #[test]
    fn rejects_empty_label_table() {
        let mut graph = StateGraph::new();
        graph.add_node("a", Noop).add_edge(START, "a").add_conditional_edges(
            "a",
            |_: &ConversationState| "x".to_string(),
            Vec::<(String, String)>::new(),
        );
        expect_invalid(&graph, "empty label table");
    }

    #[test]
    fn start_needs_exactly_one_edge() {
        let mut none = StateGraph::new();
        none.add_node("a", Noop).add_edge("a", END);
        expect_invalid(&none, "START has no outgoing edge");

        let mut two = StateGraph::new();
        two.add_node("a", Noop)
            .add_node("b", Noop)
            .add_edge(START, "a")
            .add_edge(START, "b")
            .add_edge("a", END)
            .add_edge("b", END);
        expect_invalid(&two, "START has more than one outgoing edge");
    }

    #[test]
    fn rejects_duplicate_and_reserved_names() {
        let mut dup = StateGraph::new();
        dup.add_node("a", Noop)
            .add_node("a", Noop)
            .add_edge(START, "a")
            .add_edge("a", END);
        expect_invalid(&dup, "defined twice");

        let mut reserved = StateGraph::new();
        reserved.add_node(END, Noop).add_edge(START, END);
        expect_invalid(&reserved, "reserved");
    }

    #[test]
    fn rejects_dangling_node() {
        let mut graph = StateGraph::new();
        graph
            .add_node("a", Noop)
            .add_node("b", Noop)
            .add_edge(START, "a")
            .add_edge("a", END);
        expect_invalid(&graph, "node 'b' has no outgoing edge");
    }
}
