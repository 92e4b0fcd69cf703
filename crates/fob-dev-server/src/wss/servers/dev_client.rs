//! Log channel from running apps.

use crate::delegate::{ClientLog, LoggerDelegate};
use crate::wss::{RoutePattern, UpgradeRequest, WebSocketServer};
use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use fob_multi_compiler::ClientId;
use serde::Deserialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const DEV_CLIENT_PATH: &str = "/__client";

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
enum ClientMessage {
    ClientLog(ClientLog),
}

/// Receives `{"type": "client-log", "level": ..., "data": [...]}` records
/// and hands them to a [`LoggerDelegate`]. Nothing is ever sent back.
pub struct DevClientServer {
    next_id: AtomicUsize,
    logger: Arc<dyn LoggerDelegate>,
}

impl DevClientServer {
    pub fn new(logger: Arc<dyn LoggerDelegate>) -> Self {
        Self {
            next_id: AtomicUsize::new(0),
            logger,
        }
    }

    fn handle_message(&self, client_id: &ClientId, text: &str) {
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(ClientMessage::ClientLog(log)) => self.logger.on_client_log(client_id, &log),
            Err(e) => tracing::warn!(client = %client_id, "ignoring dev client message: {}", e),
        }
    }
}

#[async_trait]
impl WebSocketServer for DevClientServer {
    fn name(&self) -> &'static str {
        "dev-client"
    }

    fn pattern(&self) -> RoutePattern {
        RoutePattern::exact(DEV_CLIENT_PATH)
    }

    async fn on_connection(self: Arc<Self>, mut socket: WebSocket, _request: UpgradeRequest) {
        let client_id = ClientId::new(format!(
            "client#{}",
            self.next_id.fetch_add(1, Ordering::Relaxed)
        ));
        tracing::debug!(client = %client_id, "dev client connected");

        while let Some(message) = socket.recv().await {
            match message {
                Ok(Message::Text(text)) => self.handle_message(&client_id, text.as_str()),
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(client = %client_id, "dev client connection error: {}", e);
                    break;
                }
            }
        }

        tracing::debug!(client = %client_id, "dev client disconnected");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Collect(Mutex<Vec<(ClientId, ClientLog)>>);

    impl LoggerDelegate for Collect {
        fn on_client_log(&self, client: &ClientId, log: &ClientLog) {
            self.0.lock().push((client.clone(), log.clone()));
        }
    }

    #[test]
    fn test_client_log_reaches_logger() {
        let logger = Arc::new(Collect::default());
        let server = DevClientServer::new(logger.clone());
        let client = ClientId::from("client#0");

        server.handle_message(&client, r#"{"type":"client-log","level":"error","data":["boom"]}"#);
        server.handle_message(&client, r#"{"type":"unknown"}"#);
        server.handle_message(&client, "garbage");

        let logs = logger.0.lock();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].0, client);
        assert_eq!(logs[0].1.level, "error");
        assert_eq!(logs[0].1.message(), "boom");
    }
}
