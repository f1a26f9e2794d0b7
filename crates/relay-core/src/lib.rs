//! Relay Core
//!
//! Agent orchestration engine: typed conversation state, the LLM/tool
//! workflow, the MCP tool-server pool and the session service boundary.
//!
//! - `state` - channels and merge policies
//! - `graph` - node/edge workflow engine
//! - `mcp` - tool-server transports, pool and schema bridge
//! - `ai` - LLM client
//! - `agent` - workflow nodes, topology and lifecycle events
//! - `session` - one running conversation behind a message/event boundary

pub mod agent;
pub mod ai;
pub mod config;
pub mod constants;
pub mod error;
pub mod graph;
pub mod mcp;
pub mod paths;
pub mod session;
pub mod state;

pub use agent::{AgentContext, LoopEvent, UserMessage};
pub use config::RelayConfig;
pub use error::{AgentError, AgentResult};
pub use session::AgentSession;
