//! Lifecycle events of a session's workflow runs.
//!
//! `LoopEvent` is everything a session reports to its caller. Per run the
//! order is `LoopStarted`, then any interleaving of `ToolCalled`, `Message`,
//! `UserInputRequested` and recoverable `Error`s, then `LoopFinished`
//! (preceded by `LoopAborted` when a cap forced the end) or a terminal
//! `Error`.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LoopEvent {
    LoopStarted,
    LoopFinished,
    /// Emitted once per tool call, in the order the LLM requested them
    ToolCalled { tool_name: String },
    /// Text from the LLM or from a command
    Message { text: String },
    /// The run is waiting for the next user message
    UserInputRequested { text: String },
    Error { description: String },
    /// A cap forced the run to END; `LoopFinished` follows
    LoopAborted { reason: String },
}

impl LoopEvent {
    pub fn error(description: impl Into<String>) -> Self {
        LoopEvent::Error {
            description: description.into(),
        }
    }
}

/// Sending half of a session's event stream.
///
/// Once `close` returns, every later `emit` is dropped.
#[derive(Clone)]
pub struct EventSink {
    tx: Arc<Mutex<Option<mpsc::UnboundedSender<LoopEvent>>>>,
}

impl EventSink {
    pub fn new(tx: mpsc::UnboundedSender<LoopEvent>) -> Self {
        Self {
            tx: Arc::new(Mutex::new(Some(tx))),
        }
    }

    /// Channel-backed sink and its receiver
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<LoopEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    /// Returns false if the event was dropped
    pub fn emit(&self, event: LoopEvent) -> bool {
        let guard = self.tx.lock();
        match guard.as_ref() {
            Some(tx) => tx.send(event).is_ok(),
            None => {
                tracing::trace!(?event, "Event dropped after sink closed");
                false
            }
        }
    }

    pub fn close(&self) {
        self.tx.lock().take();
    }

    pub fn is_closed(&self) -> bool {
        self.tx.lock().as_ref().map_or(true, |tx| tx.is_closed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_snake_case_tags() {
        let json = serde_json::to_value(LoopEvent::ToolCalled {
            tool_name: "open_url".into(),
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"type": "tool_called", "tool_name": "open_url"}));
        let json = serde_json::to_value(LoopEvent::LoopStarted).unwrap();
        assert_eq!(json, serde_json::json!({"type": "loop_started"}));
    }

    #[tokio::test]
    async fn nothing_is_delivered_after_close() {
        let (sink, mut rx) = EventSink::channel();
        assert!(sink.emit(LoopEvent::LoopStarted));
        sink.close();
        sink.clone().close();
        assert!(!sink.emit(LoopEvent::LoopFinished));
        assert!(sink.is_closed());

        assert_eq!(rx.recv().await, Some(LoopEvent::LoopStarted));
        assert_eq!(rx.recv().await, None);
    }
}
