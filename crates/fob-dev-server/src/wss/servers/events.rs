//! Events namespace for external tooling.
//!
//! Subscribers receive `{"version": 2, "type": "event", "body": ...}` for
//! build lifecycle events and everything published on the message tap.
//! They may send `{"type": "command", "command": ..., "params": ...}`, which
//! is re-broadcast to message clients.

use super::message::{MessageServer, PROTOCOL_VERSION};
use crate::wss::{spawn_writer, ClientRegistry, RoutePattern, UpgradeRequest, WebSocketServer};
use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use fob_multi_compiler::ClientId;
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

pub const EVENTS_PATH: &str = "/events";

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum IncomingEvent {
    Command {
        command: String,
        #[serde(default)]
        params: Option<Value>,
    },
}

/// Fan-out of build events and message traffic to tooling subscribers.
///
/// Message traffic only flows once [`start_relay`](Self::start_relay) has
/// been called.
pub struct EventsServer {
    clients: ClientRegistry<()>,
    messages: Arc<MessageServer>,
}

impl EventsServer {
    /// Create an events server.
    ///
    /// # Arguments
    ///
    /// * `messages` - Message hub whose tap is relayed and which receives
    ///   the commands subscribers send
    pub fn new(messages: Arc<MessageServer>) -> Self {
        Self {
            clients: ClientRegistry::new(),
            messages,
        }
    }

    /// Send an event to every subscriber.
    pub fn broadcast_event(&self, body: Value) -> usize {
        let envelope = json!({ "version": PROTOCOL_VERSION, "type": "event", "body": body });
        self.clients.broadcast(&envelope.to_string())
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Relay the message tap to subscribers until the message server is gone.
    pub fn start_relay(self: &Arc<Self>) -> JoinHandle<()> {
        let mut tap = self.messages.subscribe();
        let events = Arc::downgrade(self);

        tokio::spawn(async move {
            loop {
                match tap.recv().await {
                    Ok(event) => {
                        let Some(events) = events.upgrade() else {
                            break;
                        };
                        match serde_json::to_value(&event) {
                            Ok(body) => {
                                events.broadcast_event(body);
                            }
                            Err(e) => tracing::error!("failed to serialize message event: {}", e),
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("events relay fell behind, {} messages skipped", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            tracing::debug!("events relay stopped");
        })
    }

    fn handle_message(&self, client_id: &ClientId, text: &str) {
        match serde_json::from_str::<IncomingEvent>(text) {
            Ok(IncomingEvent::Command { command, params }) => {
                tracing::debug!(client = %client_id, command = %command, "events command");
                self.messages.broadcast(&command, params);
            }
            Err(e) => {
                tracing::warn!(client = %client_id, "ignoring events message: {}", e);
            }
        }
    }
}

#[async_trait]
impl WebSocketServer for EventsServer {
    fn name(&self) -> &'static str {
        "events"
    }

    fn pattern(&self) -> RoutePattern {
        RoutePattern::exact(EVENTS_PATH)
    }

    async fn on_connection(self: Arc<Self>, socket: WebSocket, _request: UpgradeRequest) {
        let (client_id, rx) = self.clients.register(());
        let (sink, mut stream) = socket.split();
        let writer = spawn_writer(sink, rx);
        tracing::debug!(client = %client_id, "events client connected");

        while let Some(message) = stream.next().await {
            match message {
                Ok(Message::Text(text)) => self.handle_message(&client_id, text.as_str()),
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(client = %client_id, "events connection error: {}", e);
                    break;
                }
            }
        }

        self.clients.remove(&client_id);
        writer.abort();
        tracing::debug!(client = %client_id, "events client disconnected");
    }
}
