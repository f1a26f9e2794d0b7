//! Channel schema: names, merge policies and value shapes

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::outcome::AgentOutcome;
use crate::ai::types::{AiTool, ModelMessage};
use crate::error::AgentError;

/// Named slot in the conversation state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    UserQuery,
    SystemInstructions,
    CurrentApplicationState,
    AvailableTools,
    IterationCount,
    ErrorCount,
    ChatHistory,
    AgentOutcome,
}

/// How a write combines with the stored value. Fixed per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    /// First write stores the value; any later write fails `ConfigurationLocked`
    WriteOnce,
    /// Each write replaces the stored value
    Replace,
    /// Replace, but the value may never decrease. Reads as 0 before any write.
    Counter,
    /// Each write extends an ordered sequence that is never cleared
    Append,
}

impl Channel {
    pub const ALL: [Channel; 8] = [
        Channel::UserQuery,
        Channel::SystemInstructions,
        Channel::CurrentApplicationState,
        Channel::AvailableTools,
        Channel::IterationCount,
        Channel::ErrorCount,
        Channel::ChatHistory,
        Channel::AgentOutcome,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Channel::UserQuery => "user_query",
            Channel::SystemInstructions => "system_instructions",
            Channel::CurrentApplicationState => "current_application_state",
            Channel::AvailableTools => "available_tools",
            Channel::IterationCount => "iteration_count",
            Channel::ErrorCount => "error_count",
            Channel::ChatHistory => "chat_history",
            Channel::AgentOutcome => "agent_outcome",
        }
    }

    pub fn policy(&self) -> MergePolicy {
        match self {
            Channel::UserQuery | Channel::SystemInstructions => MergePolicy::WriteOnce,
            Channel::CurrentApplicationState | Channel::AvailableTools => MergePolicy::Replace,
            Channel::IterationCount | Channel::ErrorCount => MergePolicy::Counter,
            Channel::ChatHistory | Channel::AgentOutcome => MergePolicy::Append,
        }
    }

    /// Whether `value` has the shape this channel stores
    pub fn accepts(&self, value: &ChannelValue) -> bool {
        matches!(
            (self, value),
            (
                Channel::UserQuery | Channel::SystemInstructions | Channel::CurrentApplicationState,
                ChannelValue::Text(_)
            ) | (Channel::AvailableTools, ChannelValue::Tools(_))
                | (Channel::IterationCount | Channel::ErrorCount, ChannelValue::Count(_))
                | (Channel::ChatHistory, ChannelValue::Messages(_))
                | (Channel::AgentOutcome, ChannelValue::Outcomes(_))
        )
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Channel {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Channel::ALL
            .into_iter()
            .find(|c| c.name() == s)
            .ok_or_else(|| AgentError::invalid_write(s, "unknown channel"))
    }
}

/// Value stored in (or written to) a channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ChannelValue {
    Text(String),
    Tools(Vec<AiTool>),
    Count(u64),
    Messages(Vec<ModelMessage>),
    Outcomes(Vec<AgentOutcome>),
}

impl ChannelValue {
    pub fn kind(&self) -> &'static str {
        match self {
            ChannelValue::Text(_) => "text",
            ChannelValue::Tools(_) => "tools",
            ChannelValue::Count(_) => "count",
            ChannelValue::Messages(_) => "messages",
            ChannelValue::Outcomes(_) => "outcomes",
        }
    }
}
