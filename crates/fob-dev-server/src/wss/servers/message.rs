//! Message namespace (protocol version 2).
//!
//! Clients exchange JSON envelopes:
//!
//! - notification `{version, method, params}`: broadcast to every other client
//! - request `{version, id, method, params, target}`: answered by the server
//!   when `target` is `"server"`, otherwise forwarded to client `target` with
//!   `id` rewritten to `{requestId, clientId}`
//! - response `{version, id: {requestId, clientId}, result | error}`: routed
//!   back to `clientId` with the original `id`
//!
//! Every notification and server broadcast is also published on a tap that
//! the events namespace relays.

use crate::wss::{spawn_writer, ClientRegistry, RoutePattern, UpgradeRequest, WebSocketServer};
use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use fob_multi_compiler::{ClientId, MessageEvent};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

pub const MESSAGE_PATH: &str = "/message";

/// Envelope version this server speaks.
pub const PROTOCOL_VERSION: u64 = 2;

/// Request target addressing the server itself.
const SERVER_TARGET: &str = "server";

const TAP_CAPACITY: usize = 64;

/// Query parameters a peer connected with.
type PeerInfo = HashMap<String, String>;

#[derive(Debug, Default, Deserialize)]
struct Envelope {
    version: Option<Value>,
    id: Option<Value>,
    method: Option<String>,
    params: Option<Value>,
    target: Option<String>,
    result: Option<Value>,
    error: Option<Value>,
}

/// Id of a request forwarded to another client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ForwardedId {
    request_id: Value,
    client_id: ClientId,
}

/// Peer-to-peer message hub.
///
/// Clients are remembered with the query parameters they connected with,
/// which `getpeers` reports back. Requests addressed to another client are
/// forwarded with a rewritten id so the response can find its way back.
pub struct MessageServer {
    clients: ClientRegistry<PeerInfo>,
    tap: broadcast::Sender<MessageEvent>,
}

impl Default for MessageServer {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageServer {
    /// Create a message server with no clients and an idle tap.
    ///
    /// Tap subscribers that fall more than 64 events behind miss the oldest
    /// ones.
    pub fn new() -> Self {
        let (tap, _) = broadcast::channel(TAP_CAPACITY);
        Self {
            clients: ClientRegistry::new(),
            tap,
        }
    }

    /// Receive every notification and broadcast passing through.
    pub fn subscribe(&self) -> broadcast::Receiver<MessageEvent> {
        self.tap.subscribe()
    }

    /// Send a server notification to every client.
    pub fn broadcast(&self, method: &str, params: Option<Value>) -> usize {
        let event = MessageEvent {
            method: method.to_string(),
            params,
        };
        let text = notification(&event).to_string();
        self.publish(event);
        self.clients.broadcast(&text)
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    fn publish(&self, event: MessageEvent) {
        // No subscribers is not an error.
        let _ = self.tap.send(event);
    }

    fn handle_message(&self, sender: &ClientId, text: &str) {
        let envelope: Envelope = match serde_json::from_str(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(client = %sender, "invalid message: {}", e);
                self.reply_error(sender, None, format!("Invalid message: {}", e));
                return;
            }
        };

        if envelope.version.as_ref().and_then(Value::as_u64) != Some(PROTOCOL_VERSION) {
            tracing::warn!(client = %sender, "unsupported message protocol version");
            self.reply_error(
                sender,
                envelope.id,
                format!("Unsupported protocol version, expected {}", PROTOCOL_VERSION),
            );
            return;
        }

        match (envelope.method, envelope.id) {
            (Some(method), None) => {
                let event = MessageEvent {
                    method,
                    params: envelope.params,
                };
                let text = notification(&event).to_string();
                self.clients.broadcast_where(&text, |id, _| id != sender);
                self.publish(event);
            }
            (Some(method), Some(id)) => match envelope.target.as_deref() {
                Some(SERVER_TARGET) => self.handle_server_request(sender, id, &method),
                Some(target) => {
                    self.forward_request(sender, id, target, method, envelope.params)
                }
                None => self.reply_error(sender, Some(id), "Request is missing a target".into()),
            },
            (None, Some(id)) => self.route_response(sender, id, envelope.result, envelope.error),
            (None, None) => {
                self.reply_error(sender, None, "Message has neither a method nor an id".into())
            }
        }
    }

    fn handle_server_request(&self, sender: &ClientId, id: Value, method: &str) {
        let result = match method {
            "getid" => Value::String(sender.to_string()),
            "getpeers" => {
                let peers: Map<String, Value> = self
                    .clients
                    .entries()
                    .into_iter()
                    .filter(|(peer, _)| peer != sender)
                    .map(|(peer, info)| (peer.to_string(), json!(info)))
                    .collect();
                Value::Object(peers)
            }
            other => {
                self.reply_error(sender, Some(id), format!("Unknown method: {}", other));
                return;
            }
        };

        let reply = json!({ "version": PROTOCOL_VERSION, "id": id, "result": result });
        self.clients.send(sender, &reply.to_string());
    }

    fn forward_request(
        &self,
        sender: &ClientId,
        id: Value,
        target: &str,
        method: String,
        params: Option<Value>,
    ) {
        let target_id = ClientId::from(target);
        if !self.clients.contains(&target_id) {
            self.reply_error(sender, Some(id), format!("No client found: {}", target));
            return;
        }

        let forwarded = ForwardedId {
            request_id: id,
            client_id: sender.clone(),
        };
        let mut request = json!({
            "version": PROTOCOL_VERSION,
            "id": forwarded,
            "method": method,
        });
        if let Some(params) = params {
            request["params"] = params;
        }
        self.clients.send(&target_id, &request.to_string());
    }

    fn route_response(&self, sender: &ClientId, id: Value, result: Option<Value>, error: Option<Value>) {
        let forwarded: ForwardedId = match serde_json::from_value(id) {
            Ok(forwarded) => forwarded,
            Err(_) => {
                tracing::warn!(client = %sender, "response id is not {{requestId, clientId}}");
                return;
            }
        };

        let mut response = json!({ "version": PROTOCOL_VERSION, "id": forwarded.request_id });
        if let Some(result) = result {
            response["result"] = result;
        }
        if let Some(error) = error {
            response["error"] = error;
        }

        if !self.clients.send(&forwarded.client_id, &response.to_string()) {
            tracing::debug!(client = %forwarded.client_id, "requester is gone, response dropped");
        }
    }

    fn reply_error(&self, sender: &ClientId, id: Option<Value>, message: String) {
        let mut reply = json!({
            "version": PROTOCOL_VERSION,
            "error": { "message": message },
        });
        if let Some(id) = id {
            reply["id"] = id;
        }
        self.clients.send(sender, &reply.to_string());
    }
}

fn notification(event: &MessageEvent) -> Value {
    let mut value = json!({ "version": PROTOCOL_VERSION, "method": event.method });
    if let Some(params) = &event.params {
        value["params"] = params.clone();
    }
    value
}

#[async_trait]
impl WebSocketServer for MessageServer {
    fn name(&self) -> &'static str {
        "message"
    }

    fn pattern(&self) -> RoutePattern {
        RoutePattern::exact(MESSAGE_PATH)
    }

    async fn on_connection(self: Arc<Self>, socket: WebSocket, request: UpgradeRequest) {
        let (client_id, rx) = self.clients.register(request.query);
        let (sink, mut stream) = socket.split();
        let writer = spawn_writer(sink, rx);
        tracing::debug!(client = %client_id, "message client connected");

        while let Some(message) = stream.next().await {
            match message {
                Ok(Message::Text(text)) => self.handle_message(&client_id, text.as_str()),
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(client = %client_id, "message connection error: {}", e);
                    break;
                }
            }
        }

        self.clients.remove(&client_id);
        writer.abort();
        tracing::debug!(client = %client_id, "message client disconnected");
    }
}
