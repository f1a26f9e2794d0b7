//! Narrow interfaces to the collaborators a session consumes but does not own

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;

/// Append-only tagged memory
#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn append(&self, tag: &str, item: &str) -> Result<()>;

    /// Every item under `tag`, one per line; empty if none
    async fn read(&self, tag: &str) -> Result<String>;
}

#[derive(Default)]
pub struct InMemoryStore {
    items: Mutex<HashMap<String, Vec<String>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn append(&self, tag: &str, item: &str) -> Result<()> {
        self.items
            .lock()
            .entry(tag.to_string())
            .or_default()
            .push(item.to_string());
        Ok(())
    }

    async fn read(&self, tag: &str) -> Result<String> {
        Ok(self
            .items
            .lock()
            .get(tag)
            .map(|items| items.join("\n"))
            .unwrap_or_default())
    }
}

/// A message the command handler claimed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub name: String,
    pub args: String,
}

/// Decides whether raw user text is a command rather than a request
#[async_trait]
pub trait CommandHandler: Send + Sync {
    fn classify(&self, text: &str) -> Option<Command>;

    /// Run a claimed command; the text is reported back as a `Message`
    async fn execute(&self, command: Command) -> Result<String>;
}

/// Every message goes to the workflow
pub struct NoCommands;

#[async_trait]
impl CommandHandler for NoCommands {
    fn classify(&self, _text: &str) -> Option<Command> {
        None
    }

    async fn execute(&self, command: Command) -> Result<String> {
        Err(anyhow::anyhow!("no handler for command '{}'", command.name))
    }
}
