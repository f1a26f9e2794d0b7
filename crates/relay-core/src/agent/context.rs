//! Explicit context handed to every component
//!
//! `AgentContext` is built once per process and shared by all sessions.
//! `RunContext` adds what belongs to one session: its event sink and its
//! inbox (read by `ask_user` while a run waits for the user).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use super::loop_events::EventSink;
use crate::ai::LanguageModel;
use crate::config::RelayConfig;
use crate::mcp::ToolServerPool;
use crate::session::collaborators::{CommandHandler, InMemoryStore, MemoryStore, NoCommands};

pub struct AgentContext {
    pub pool: Arc<ToolServerPool>,
    pub llm: Arc<dyn LanguageModel>,
    pub config: RelayConfig,
    pub memory: Arc<dyn MemoryStore>,
    pub commands: Arc<dyn CommandHandler>,
}

impl AgentContext {
    /// In-memory store and no command handling
    pub fn new(pool: Arc<ToolServerPool>, llm: Arc<dyn LanguageModel>, config: RelayConfig) -> Self {
        Self {
            pool,
            llm,
            config,
            memory: Arc::new(InMemoryStore::new()),
            commands: Arc::new(NoCommands),
        }
    }

    pub fn with_memory(mut self, memory: Arc<dyn MemoryStore>) -> Self {
        self.memory = memory;
        self
    }

    pub fn with_commands(mut self, commands: Arc<dyn CommandHandler>) -> Self {
        self.commands = commands;
        self
    }
}

/// A message submitted to a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserMessage {
    pub text: String,
    pub application_state: Option<String>,
}

impl UserMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            application_state: None,
        }
    }
}

/// Receiving side of a session's message queue.
///
/// Every message is stamped with a sequence number when it is enqueued.
/// `ask_user` only accepts a reply stamped at or after the moment the
/// question went out; anything older is set aside, in order, and handed
/// back to the worker as its own request.
pub struct Inbox {
    rx: Mutex<mpsc::UnboundedReceiver<(u64, UserMessage)>>,
    deferred: parking_lot::Mutex<VecDeque<UserMessage>>,
    next_seq: Arc<AtomicU64>,
}

/// Sending side of an `Inbox`
#[derive(Clone)]
pub struct InboxSender {
    tx: mpsc::UnboundedSender<(u64, UserMessage)>,
    next_seq: Arc<AtomicU64>,
}

impl InboxSender {
    /// Fails only when the inbox is gone
    pub fn send(&self, message: UserMessage) -> Result<(), UserMessage> {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        self.tx.send((seq, message)).map_err(|e| e.0 .1)
    }
}

impl Inbox {
    pub fn channel() -> (InboxSender, Arc<Inbox>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let next_seq = Arc::new(AtomicU64::new(0));
        let sender = InboxSender {
            tx,
            next_seq: Arc::clone(&next_seq),
        };
        let inbox = Inbox {
            rx: Mutex::new(rx),
            deferred: parking_lot::Mutex::new(VecDeque::new()),
            next_seq,
        };
        (sender, Arc::new(inbox))
    }

    /// Next request for the worker: set-aside messages first, in arrival order.
    /// Cancel safe.
    pub async fn next(&self) -> Option<UserMessage> {
        if let Some(message) = self.deferred.lock().pop_front() {
            return Some(message);
        }
        self.rx.lock().await.recv().await.map(|(_, message)| message)
    }

    /// Sequence number the next enqueued message will carry
    pub fn mark(&self) -> u64 {
        self.next_seq.load(Ordering::SeqCst)
    }

    /// First message enqueued at or after `mark`. Older messages are set
    /// aside for `next`. Cancel safe.
    pub async fn reply_after(&self, mark: u64) -> Option<UserMessage> {
        let mut rx = self.rx.lock().await;
        loop {
            let (seq, message) = rx.recv().await?;
            if seq >= mark {
                return Some(message);
            }
            self.deferred.lock().push_back(message);
        }
    }

    pub fn deferred_len(&self) -> usize {
        self.deferred.lock().len()
    }
}

/// What the workflow nodes see during one session's runs
pub struct RunContext {
    pub agent: Arc<AgentContext>,
    pub events: EventSink,
    pub inbox: Arc<Inbox>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reply_skips_messages_queued_before_the_mark() {
        let (tx, inbox) = Inbox::channel();
        tx.send(UserMessage::text("open gmail")).unwrap();
        tx.send(UserMessage::text("open maps")).unwrap();

        let mark = inbox.mark();
        tx.send(UserMessage::text("Safari")).unwrap();

        let reply = inbox.reply_after(mark).await.unwrap();
        assert_eq!(reply.text, "Safari");
        assert_eq!(inbox.deferred_len(), 2);

        assert_eq!(inbox.next().await.unwrap().text, "open gmail");
        assert_eq!(inbox.next().await.unwrap().text, "open maps");
        assert_eq!(inbox.deferred_len(), 0);
    }

    #[tokio::test]
    async fn next_reads_the_queue_in_order() {
        let (tx, inbox) = Inbox::channel();
        tx.send(UserMessage::text("one")).unwrap();
        tx.send(UserMessage::text("two")).unwrap();
        assert_eq!(inbox.next().await.unwrap().text, "one");
        assert_eq!(inbox.next().await.unwrap().text, "two");

        drop(tx);
        assert!(inbox.next().await.is_none());
    }
}
