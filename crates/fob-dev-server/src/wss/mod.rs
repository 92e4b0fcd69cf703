//! Multiplexed WebSocket namespaces.
//!
//! Every namespace is served by one [`WebSocketServer`]. The
//! [`WebSocketRouter`] picks the server for an upgrade request by path and
//! hands it the socket; from then on the server owns the connection.

mod registry;
mod router;
pub mod servers;

pub use registry::{ClientRegistry, CLIENT_BUFFER};
pub use router::{upgrade_middleware, WebSocketRouter};

use async_trait::async_trait;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Path a server is reachable under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RoutePattern {
    /// Only this exact path
    Exact(String),
    /// This path and anything below it
    Prefix(String),
}

impl RoutePattern {
    pub fn exact(path: impl Into<String>) -> Self {
        RoutePattern::Exact(path.into())
    }

    pub fn prefix(path: impl Into<String>) -> Self {
        RoutePattern::Prefix(path.into())
    }

    /// The registered path.
    pub fn path(&self) -> &str {
        match self {
            RoutePattern::Exact(path) | RoutePattern::Prefix(path) => path,
        }
    }

    /// Whether `path` is routed to this pattern.
    pub fn matches(&self, path: &str) -> bool {
        match self {
            RoutePattern::Exact(exact) => path == exact,
            RoutePattern::Prefix(prefix) => {
                path == prefix
                    || path
                        .strip_prefix(prefix.as_str())
                        .is_some_and(|rest| rest.starts_with('/') || prefix.ends_with('/'))
            }
        }
    }
}

/// What a server learns about an accepted upgrade.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpgradeRequest {
    /// Request path
    pub path: String,
    /// Decoded query parameters
    pub query: HashMap<String, String>,
}

impl UpgradeRequest {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            query: HashMap::new(),
        }
    }

    /// A query parameter, ignoring empty values.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.query
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }
}

/// A protocol sub-server owning one WebSocket namespace.
#[async_trait]
pub trait WebSocketServer: Send + Sync + 'static {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Path this server is registered under.
    fn pattern(&self) -> RoutePattern;

    /// Take ownership of an accepted connection and serve it until it closes.
    async fn on_connection(self: Arc<Self>, socket: WebSocket, request: UpgradeRequest);
}

/// Forward queued messages to the write half of a socket.
///
/// Ends when the queue closes (client removed from its registry) or a write
/// fails; either way the socket is closed.
pub(crate) fn spawn_writer(
    mut sink: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Message>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if let Err(e) = sink.send(message).await {
                tracing::debug!("websocket write failed: {}", e);
                break;
            }
        }
        let _ = sink.close().await;
    })
}

/// Send a close frame and drop the socket.
pub(crate) async fn close_with(mut socket: WebSocket, code: u16, reason: &'static str) {
    let frame = CloseFrame {
        code,
        reason: reason.into(),
    };
    if let Err(e) = socket.send(Message::Close(Some(frame))).await {
        tracing::debug!("failed to send close frame: {}", e);
    }
}
