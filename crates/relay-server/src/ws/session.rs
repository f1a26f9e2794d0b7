//! WebSocket agent session handler.
//!
//! One connection drives one `AgentSession`. The first `send_user_message`
//! frame opens it; every `LoopEvent` is forwarded as a JSON text frame.
//! Losing the connection terminates the session.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde::Deserialize;
use tracing::{debug, info, warn};

use relay_core::{AgentContext, AgentSession, LoopEvent};

use crate::AppState;

const MAX_FRAME_SIZE: usize = 64 * 1024;

#[derive(Debug, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    SendUserMessage {
        text: String,
        #[serde(default)]
        application_state: Option<String>,
    },
    Terminate,
}

enum Frame {
    Client(ClientMessage),
    Invalid(String),
    Closed,
}

pub async fn handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket: WebSocket| async move {
        let (sink, stream) = socket.split();
        drive(sink, stream, state.agent).await;
    })
}

/// Next meaningful frame from the client. Cancel safe.
async fn next_frame<St>(stream: &mut St) -> Frame
where
    St: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    loop {
        let text = match stream.next().await {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Close(_))) | None => return Frame::Closed,
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                debug!("WebSocket receive error: {}", e);
                return Frame::Closed;
            }
        };
        if text.len() > MAX_FRAME_SIZE {
            return Frame::Invalid(format!("frame exceeds {} bytes", MAX_FRAME_SIZE));
        }
        return match serde_json::from_str(&text) {
            Ok(message) => Frame::Client(message),
            Err(e) => Frame::Invalid(format!("invalid frame: {}", e)),
        };
    }
}

/// Returns false once the client can no longer be written to
async fn send_event<Si>(sink: &mut Si, event: &LoopEvent) -> bool
where
    Si: Sink<Message> + Unpin,
{
    match serde_json::to_string(event) {
        Ok(json) => sink.send(Message::Text(json)).await.is_ok(),
        Err(e) => {
            warn!("Failed to serialize event: {}", e);
            true
        }
    }
}

fn deliver(session: &AgentSession, text: String, application_state: Option<String>) {
    match application_state {
        Some(app_state) => session.send_user_message_with_state(text, app_state),
        None => session.send_user_message(text),
    }
}

async fn drive<Si, St>(mut sink: Si, mut stream: St, agent: Arc<AgentContext>)
where
    Si: Sink<Message> + Unpin,
    St: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let (text, application_state) = loop {
        match next_frame(&mut stream).await {
            Frame::Client(ClientMessage::SendUserMessage {
                text,
                application_state,
            }) => break (text, application_state),
            Frame::Client(ClientMessage::Terminate) | Frame::Closed => {
                debug!("WebSocket closed before a session was opened");
                return;
            }
            Frame::Invalid(reason) => {
                if !send_event(&mut sink, &LoopEvent::error(reason)).await {
                    return;
                }
            }
        }
    };

    let (session, mut events) = match AgentSession::open(agent) {
        Ok(opened) => opened,
        Err(e) => {
            warn!("Failed to open session: {}", e);
            send_event(&mut sink, &LoopEvent::error(e.to_string())).await;
            return;
        }
    };
    info!(session_id = %session.id(), "WebSocket session opened");
    deliver(&session, text, application_state);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => {
                    if !send_event(&mut sink, &event).await {
                        break;
                    }
                }
                None => break,
            },
            frame = next_frame(&mut stream) => match frame {
                Frame::Client(ClientMessage::SendUserMessage { text, application_state }) => {
                    deliver(&session, text, application_state);
                }
                Frame::Client(ClientMessage::Terminate) => session.terminate(),
                Frame::Invalid(reason) => {
                    if !send_event(&mut sink, &LoopEvent::error(reason)).await {
                        break;
                    }
                }
                Frame::Closed => break,
            },
        }
    }

    session.terminate();
    let _ = sink.send(Message::Close(None)).await;
    info!(session_id = %session.id(), "WebSocket session closed");
}
