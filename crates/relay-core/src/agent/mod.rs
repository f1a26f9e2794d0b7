//! The agent: workflow nodes, topology and lifecycle events
//!
//! - `LlmNode` / `ToolNode` - the two steps of the loop
//! - `build_workflow` - compiled `START -> llm_node <-> tool_node -> END` graph
//! - `LoopEvent` / `EventSink` - what a session reports to its caller
//! - `AgentContext` / `RunContext` - explicit dependencies, no globals

pub mod context;
pub mod executor;
pub mod loop_events;
pub mod nodes;
pub mod workflow;

#[cfg(test)]
pub(crate) mod testing;

pub use context::{AgentContext, RunContext, UserMessage};
pub use executor::ask_user_tool;
pub use loop_events::{EventSink, LoopEvent};
pub use nodes::{LlmNode, ToolNode};
pub use workflow::{build_workflow, route_after_llm};
