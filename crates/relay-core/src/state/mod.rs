//! Conversation state
//!
//! A fixed set of named channels, each with a merge policy. Nodes never
//! mutate state directly: they return a `StateUpdate` and the runner folds it
//! in with `ConversationState::apply`, which is all-or-nothing.

mod channels;
mod outcome;

use std::collections::HashMap;

pub use channels::{Channel, ChannelValue, MergePolicy};
pub use outcome::{AgentOutcome, ToolOutcome};

use crate::ai::types::{AiTool, ModelMessage};
use crate::error::{AgentError, AgentResult};

static ZERO_COUNT: ChannelValue = ChannelValue::Count(0);

/// Snapshot of every channel. Cloning is how a step gets its own copy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationState {
    values: HashMap<Channel, ChannelValue>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of a channel. Counters read as 0 before their first write;
    /// other unwritten channels read as `None`.
    pub fn get(&self, channel: Channel) -> Option<&ChannelValue> {
        match self.values.get(&channel) {
            Some(value) => Some(value),
            None if channel.policy() == MergePolicy::Counter => Some(&ZERO_COUNT),
            None => None,
        }
    }

    /// Fold `update` into a copy of this state and return it.
    ///
    /// Writes are applied in order. If any write fails, the error is returned
    /// and `self` is untouched.
    pub fn apply(&self, update: &StateUpdate) -> AgentResult<ConversationState> {
        let mut next = self.clone();
        for (name, value) in &update.writes {
            let channel: Channel = name.parse()?;
            next.merge(channel, value.clone())?;
        }
        Ok(next)
    }

    fn merge(&mut self, channel: Channel, value: ChannelValue) -> AgentResult<()> {
        if !channel.accepts(&value) {
            return Err(AgentError::invalid_write(
                channel.name(),
                format!("cannot store a {} value", value.kind()),
            ));
        }

        match channel.policy() {
            MergePolicy::WriteOnce => {
                if self.values.contains_key(&channel) {
                    return Err(AgentError::ConfigurationLocked {
                        channel: channel.name().to_string(),
                    });
                }
                self.values.insert(channel, value);
            }
            MergePolicy::Replace => {
                self.values.insert(channel, value);
            }
            MergePolicy::Counter => {
                let current = self.count(channel);
                if let ChannelValue::Count(n) = value {
                    if n < current {
                        return Err(AgentError::invalid_write(
                            channel.name(),
                            format!("counter cannot decrease from {} to {}", current, n),
                        ));
                    }
                }
                self.values.insert(channel, value);
            }
            MergePolicy::Append => {
                let merged = match (self.values.remove(&channel), value) {
                    (Some(ChannelValue::Messages(mut existing)), ChannelValue::Messages(more)) => {
                        existing.extend(more);
                        ChannelValue::Messages(existing)
                    }
                    (Some(ChannelValue::Outcomes(mut existing)), ChannelValue::Outcomes(more)) => {
                        existing.extend(more);
                        ChannelValue::Outcomes(existing)
                    }
                    (_, value) => value,
                };
                self.values.insert(channel, merged);
            }
        }
        Ok(())
    }

    fn text(&self, channel: Channel) -> Option<&str> {
        match self.values.get(&channel) {
            Some(ChannelValue::Text(text)) => Some(text),
            _ => None,
        }
    }

    fn count(&self, channel: Channel) -> u64 {
        match self.values.get(&channel) {
            Some(ChannelValue::Count(n)) => *n,
            _ => 0,
        }
    }

    pub fn user_query(&self) -> Option<&str> {
        self.text(Channel::UserQuery)
    }

    pub fn system_instructions(&self) -> Option<&str> {
        self.text(Channel::SystemInstructions)
    }

    pub fn application_state(&self) -> Option<&str> {
        self.text(Channel::CurrentApplicationState)
    }

    pub fn available_tools(&self) -> &[AiTool] {
        match self.values.get(&Channel::AvailableTools) {
            Some(ChannelValue::Tools(tools)) => tools,
            _ => &[],
        }
    }

    pub fn iteration_count(&self) -> u64 {
        self.count(Channel::IterationCount)
    }

    pub fn error_count(&self) -> u64 {
        self.count(Channel::ErrorCount)
    }

    pub fn chat_history(&self) -> &[ModelMessage] {
        match self.values.get(&Channel::ChatHistory) {
            Some(ChannelValue::Messages(messages)) => messages,
            _ => &[],
        }
    }

    pub fn agent_outcomes(&self) -> &[AgentOutcome] {
        match self.values.get(&Channel::AgentOutcome) {
            Some(ChannelValue::Outcomes(outcomes)) => outcomes,
            _ => &[],
        }
    }

    pub fn last_outcome(&self) -> Option<&AgentOutcome> {
        self.agent_outcomes().last()
    }
}

/// Ordered set of channel writes produced by one node execution
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateUpdate {
    writes: Vec<(String, ChannelValue)>,
}

impl StateUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Write by channel name. Unknown names are rejected when applied.
    pub fn write(mut self, channel: impl Into<String>, value: ChannelValue) -> Self {
        self.writes.push((channel.into(), value));
        self
    }

    pub fn set(self, channel: Channel, value: ChannelValue) -> Self {
        self.write(channel.name(), value)
    }

    /// Append the writes of `other` after this update's own
    pub fn merge(mut self, other: StateUpdate) -> Self {
        self.writes.extend(other.writes);
        self
    }

    pub fn user_query(self, text: impl Into<String>) -> Self {
        self.set(Channel::UserQuery, ChannelValue::Text(text.into()))
    }

    pub fn system_instructions(self, text: impl Into<String>) -> Self {
        self.set(Channel::SystemInstructions, ChannelValue::Text(text.into()))
    }

    pub fn application_state(self, text: impl Into<String>) -> Self {
        self.set(
            Channel::CurrentApplicationState,
            ChannelValue::Text(text.into()),
        )
    }

    pub fn available_tools(self, tools: Vec<AiTool>) -> Self {
        self.set(Channel::AvailableTools, ChannelValue::Tools(tools))
    }

    pub fn iteration_count(self, n: u64) -> Self {
        self.set(Channel::IterationCount, ChannelValue::Count(n))
    }

    pub fn error_count(self, n: u64) -> Self {
        self.set(Channel::ErrorCount, ChannelValue::Count(n))
    }

    pub fn append_history(self, messages: Vec<ModelMessage>) -> Self {
        self.set(Channel::ChatHistory, ChannelValue::Messages(messages))
    }

    pub fn append_outcome(self, outcome: AgentOutcome) -> Self {
        self.set(Channel::AgentOutcome, ChannelValue::Outcomes(vec![outcome]))
    }
}
