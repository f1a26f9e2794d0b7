//! Session service boundary
//!
//! An `AgentSession` owns one conversation state and one compiled workflow.
//! Callers push messages in with `send_user_message` and read `LoopEvent`s
//! from the receiver returned by `open`; nothing is ever returned as a reply.
//! Messages are processed strictly one at a time by a single worker task.

pub mod collaborators;

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub use collaborators::{Command, CommandHandler, InMemoryStore, MemoryStore, NoCommands};

use crate::agent::context::{AgentContext, Inbox, InboxSender, RunContext, UserMessage};
use crate::agent::executor::ask_user_tool;
use crate::agent::loop_events::{EventSink, LoopEvent};
use crate::agent::workflow::build_workflow;
use crate::ai::types::{AiTool, ModelMessage};
use crate::constants::agent::ASK_USER_TOOL;
use crate::error::AgentResult;
use crate::graph::{CompiledGraph, Termination};
use crate::state::{ConversationState, StateUpdate};

const PREFERENCES_TAG: &str = "preferences";
const HISTORY_TAG: &str = "history";

/// Handle to a running session. Dropping it terminates the session.
pub struct AgentSession {
    id: String,
    inbox: InboxSender,
    events: EventSink,
    cancel: CancellationToken,
    snapshot: Arc<Mutex<ConversationState>>,
}

impl AgentSession {
    /// Compile the workflow and start the session's worker.
    ///
    /// Fails only if the workflow does not compile.
    pub fn open(
        agent: Arc<AgentContext>,
    ) -> AgentResult<(Self, mpsc::UnboundedReceiver<LoopEvent>)> {
        let graph = build_workflow()?;
        let id = uuid::Uuid::new_v4().to_string();
        let (events, event_rx) = EventSink::channel();
        let (inbox_tx, inbox) = Inbox::channel();
        let cancel = CancellationToken::new();
        let snapshot = Arc::new(Mutex::new(ConversationState::new()));

        let worker = SessionWorker {
            id: id.clone(),
            graph,
            state: ConversationState::new(),
            snapshot: Arc::clone(&snapshot),
            run: RunContext {
                agent,
                events: events.clone(),
                inbox,
            },
        };
        tokio::spawn(worker.run(cancel.clone()));
        info!(session_id = %id, "Session opened");

        let session = Self {
            id,
            inbox: inbox_tx,
            events,
            cancel,
            snapshot,
        };
        Ok((session, event_rx))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Queue a message; returns as soon as it is accepted
    pub fn send_user_message(&self, text: impl Into<String>) {
        self.enqueue(UserMessage::text(text));
    }

    /// Queue a message that also replaces `current_application_state`
    pub fn send_user_message_with_state(
        &self,
        text: impl Into<String>,
        application_state: impl Into<String>,
    ) {
        self.enqueue(UserMessage {
            text: text.into(),
            application_state: Some(application_state.into()),
        });
    }

    fn enqueue(&self, message: UserMessage) {
        if self.cancel.is_cancelled() {
            debug!(session_id = %self.id, "Ignoring message for terminated session");
            return;
        }
        if self.inbox.send(message).is_err() {
            warn!(session_id = %self.id, "Session worker is gone, message dropped");
        }
    }

    /// Cancel the in-flight run and stop the session. Safe to call repeatedly.
    pub fn terminate(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.events.close();
        self.cancel.cancel();
        info!(session_id = %self.id, "Session terminated");
    }

    pub fn is_terminated(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Conversation state as of the end of the last run
    pub fn state(&self) -> ConversationState {
        self.snapshot.lock().clone()
    }
}

impl Drop for AgentSession {
    fn drop(&mut self) {
        self.terminate();
    }
}

struct SessionWorker {
    id: String,
    graph: CompiledGraph<RunContext>,
    state: ConversationState,
    snapshot: Arc<Mutex<ConversationState>>,
    run: RunContext,
}

impl SessionWorker {
    async fn run(mut self, cancel: CancellationToken) {
        loop {
            let inbox = Arc::clone(&self.run.inbox);
            let message = tokio::select! {
                _ = cancel.cancelled() => break,
                message = inbox.next() => match message {
                    Some(message) => message,
                    None => break,
                },
            };
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.handle(message) => {}
            }
        }
        debug!(session_id = %self.id, "Session worker stopped");
    }

    async fn handle(&mut self, message: UserMessage) {
        let agent = Arc::clone(&self.run.agent);
        let events = &self.run.events;

        if let Some(command) = agent.commands.classify(&message.text) {
            info!(session_id = %self.id, command = %command.name, "Message claimed by command handler");
            match agent.commands.execute(command).await {
                Ok(text) => events.emit(LoopEvent::Message { text }),
                Err(e) => events.emit(LoopEvent::error(format!("{:#}", e))),
            };
            return;
        }

        events.emit(LoopEvent::LoopStarted);
        let text = message.text.clone();
        let result = self.pass(message).await;
        *self.snapshot.lock() = self.state.clone();

        let events = &self.run.events;
        match result {
            Ok(Termination::Finished) => {
                if let Err(e) = agent.memory.append(HISTORY_TAG, &text).await {
                    warn!(session_id = %self.id, "Failed to record history: {:#}", e);
                }
                info!(session_id = %self.id, iterations = self.state.iteration_count(), "Run finished");
                events.emit(LoopEvent::LoopFinished);
            }
            Ok(Termination::Aborted(reason)) => {
                warn!(session_id = %self.id, %reason, "Run aborted");
                events.emit(LoopEvent::LoopAborted { reason });
                events.emit(LoopEvent::LoopFinished);
            }
            Err(e) => {
                error!(session_id = %self.id, "Run failed: {}", e);
                events.emit(LoopEvent::error(e.to_string()));
            }
        }
    }

    /// Fold the message into state, refresh tools and drive one run
    async fn pass(&mut self, message: UserMessage) -> AgentResult<Termination> {
        let agent = Arc::clone(&self.run.agent);
        let mut update = StateUpdate::new();

        if self.state.user_query().is_none() {
            let preferences = match agent.memory.read(PREFERENCES_TAG).await {
                Ok(preferences) => preferences,
                Err(e) => {
                    warn!(session_id = %self.id, "Failed to read preferences: {:#}", e);
                    String::new()
                }
            };
            update = update
                .user_query(message.text.clone())
                .system_instructions(compose_instructions(
                    &agent.config.agent.system_instructions,
                    &preferences,
                ));
        }
        if let Some(app_state) = message.application_state {
            update = update.application_state(app_state);
        }

        let catalog = agent.pool.aggregate();
        update = update
            .available_tools(offered_tools(catalog.tools))
            .append_history(vec![ModelMessage::user_text(message.text)]);
        self.state = self.state.apply(&update)?;

        let limits = agent.config.run_limits();
        self.graph.run(&mut self.state, &self.run, limits).await
    }
}

fn compose_instructions(base: &str, preferences: &str) -> String {
    if preferences.trim().is_empty() {
        return base.to_string();
    }
    format!("{}\n\nUser preferences:\n{}", base, preferences.trim())
}

/// Server tools plus the built-in `ask_user`, which shadows a server tool of the same name
fn offered_tools(mut tools: Vec<AiTool>) -> Vec<AiTool> {
    if tools.iter().any(|t| t.name == ASK_USER_TOOL) {
        warn!("A tool server advertises '{}'; the built-in tool wins", ASK_USER_TOOL);
        tools.retain(|t| t.name != ASK_USER_TOOL);
    }
    tools.push(ask_user_tool());
    tools
}
