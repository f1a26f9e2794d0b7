//! Error taxonomy for the orchestration engine
//!
//! `GraphInvalid` is the only compile-time fatal error. Everything else is a
//! run-time condition that is either isolated (per server), recorded in the
//! conversation state (LLM/tool failures), or reported through the session's
//! event stream.

use thiserror::Error;

/// Errors produced by the agent core.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AgentError {
    /// A write-once channel was written a second time.
    #[error("channel '{channel}' is locked after its first write")]
    ConfigurationLocked { channel: String },

    /// Unknown channel name, or a value of the wrong shape for the channel.
    #[error("invalid write to channel '{channel}': {reason}")]
    InvalidChannelWrite { channel: String, reason: String },

    /// Workflow topology defect, reported by `StateGraph::compile`.
    #[error("workflow graph is invalid: {0}")]
    GraphInvalid(String),

    /// A conditional edge predicate returned a label its table does not know.
    #[error("node '{node}' routed to unknown label '{label}'")]
    UnknownRouteLabel { node: String, label: String },

    #[error("tools of server '{server}' are unavailable: {reason}")]
    ToolListUnavailable { server: String, reason: String },

    /// Two different servers advertise the same tool name.
    #[error("tool '{tool}' is advertised by more than one server: {}", servers.join(", "))]
    ToolNameCollision { tool: String, servers: Vec<String> },

    #[error("no connected server advertises tool '{0}'")]
    UnknownTool(String),

    #[error("tool call failed on server '{server}': {cause}")]
    ToolInvocationFailed { server: String, cause: String },

    #[error("LLM call failed: {0}")]
    LlmCallFailed(String),

    /// Iteration or error cap reached; the loop was forced to END.
    #[error("loop aborted: {0}")]
    LoopAborted(String),

    #[error("connection to server '{server}' failed: {cause}")]
    ConnectionFailed { server: String, cause: String },

    #[error("{operation} timed out after {seconds}s")]
    Timeout { operation: String, seconds: u64 },
}

impl AgentError {
    pub fn invalid_write(channel: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidChannelWrite {
            channel: channel.into(),
            reason: reason.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, duration: std::time::Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            seconds: duration.as_secs(),
        }
    }
}

pub type AgentResult<T> = Result<T, AgentError>;
