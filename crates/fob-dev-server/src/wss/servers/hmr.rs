//! Hot module replacement namespace.
//!
//! Clients connect to `/hmr?platform=<target>` and receive `building`,
//! `built` and `sync` events for that target only.
//!
//! Connections without a `platform` parameter are closed with a policy
//! violation. A freshly connected client is brought up to date by whatever
//! the [`HmrDelegate`] returns from `on_client_connected`, typically a
//! `sync` event carrying the last build.
//!
//! # Example
//!
//! ```rust,ignore
//! // Tell every iOS client a rebuild started.
//! hmr.send(&HmrEvent::Building, &Target::from("ios"), None);
//! ```

use crate::delegate::HmrDelegate;
use crate::wss::{close_with, spawn_writer, ClientRegistry, RoutePattern, UpgradeRequest, WebSocketServer};
use async_trait::async_trait;
use axum::extract::ws::{close_code, Message, WebSocket};
use fob_multi_compiler::{ClientId, HmrEvent, Target};
use futures_util::StreamExt;
use std::sync::Arc;

pub const HMR_PATH: &str = "/hmr";

/// HMR event fan-out, keyed by the target each client connected for.
pub struct HmrServer {
    clients: ClientRegistry<Target>,
    delegate: Arc<dyn HmrDelegate>,
}

impl HmrServer {
    /// Create an HMR server.
    ///
    /// # Arguments
    ///
    /// * `delegate` - Receives connects, messages and disconnects, and
    ///   produces the event sent to a client right after it connects
    pub fn new(delegate: Arc<dyn HmrDelegate>) -> Self {
        Self {
            clients: ClientRegistry::new(),
            delegate,
        }
    }

    /// Send `event` to the clients of `target`.
    ///
    /// With `client_ids` only those of them receive it; ids that are not
    /// connected (or belong to another target) are skipped. Returns how many
    /// clients were reached.
    pub fn send(&self, event: &HmrEvent, target: &Target, client_ids: Option<&[ClientId]>) -> usize {
        let text = match serde_json::to_string(event) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!("failed to serialize hmr event: {}", e);
                return 0;
            }
        };

        self.clients.broadcast_where(&text, |id, client_target| {
            client_target == target && client_ids.is_none_or(|ids| ids.contains(id))
        })
    }

    /// Number of connected HMR clients.
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Connected clients with their targets.
    pub fn clients(&self) -> Vec<(ClientId, Target)> {
        self.clients.entries()
    }
}

#[async_trait]
impl WebSocketServer for HmrServer {
    fn name(&self) -> &'static str {
        "hmr"
    }

    fn pattern(&self) -> RoutePattern {
        RoutePattern::exact(HMR_PATH)
    }

    async fn on_connection(self: Arc<Self>, socket: WebSocket, request: UpgradeRequest) {
        let Some(target) = request.param("platform").map(Target::from) else {
            tracing::warn!("hmr client connected without a platform");
            close_with(socket, close_code::POLICY, "Missing platform query parameter").await;
            return;
        };

        let (client_id, rx) = self.clients.register(target.clone());
        let (sink, mut stream) = socket.split();
        let writer = spawn_writer(sink, rx);
        tracing::debug!(platform = %target, client = %client_id, "hmr client connected");

        if let Some(event) = self.delegate.on_client_connected(&target, &client_id) {
            self.send(&event, &target, Some(std::slice::from_ref(&client_id)));
        }

        while let Some(message) = stream.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    self.delegate
                        .on_client_message(&target, &client_id, text.as_str());
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(client = %client_id, "hmr connection error: {}", e);
                    break;
                }
            }
        }

        self.clients.remove(&client_id);
        writer.abort();
        tracing::debug!(platform = %target, client = %client_id, "hmr client disconnected");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoSync;

    impl HmrDelegate for NoSync {
        fn on_client_connected(&self, _target: &Target, _client_id: &ClientId) -> Option<HmrEvent> {
            None
        }
    }

    #[test]
    fn test_send_to_subset_of_target() {
        let server = HmrServer::new(Arc::new(NoSync));
        let android = Target::from("android");
        let (first, mut rx_first) = server.clients.register(android.clone());
        let (_second, mut rx_second) = server.clients.register(android.clone());
        let (ios, mut rx_ios) = server.clients.register(Target::from("ios"));

        let subset = [first, ios, ClientId::from("client#99")];
        assert_eq!(server.send(&HmrEvent::Building, &android, Some(&subset)), 1);

        assert!(rx_first.try_recv().is_ok());
        assert!(rx_second.try_recv().is_err());
        assert!(rx_ios.try_recv().is_err());
    }

    #[test]
    fn test_send_to_whole_target() {
        let server = HmrServer::new(Arc::new(NoSync));
        let android = Target::from("android");
        let _first = server.clients.register(android.clone());
        let _second = server.clients.register(android.clone());
        let _ios = server.clients.register(Target::from("ios"));

        assert_eq!(server.send(&HmrEvent::Built(None), &android, None), 2);
        assert_eq!(server.client_count(), 3);
    }
}
