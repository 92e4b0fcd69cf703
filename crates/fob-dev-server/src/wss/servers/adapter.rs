//! Adapters mounting externally implemented endpoints (debugger proxies and
//! the like) into the router.

use crate::wss::{close_with, RoutePattern, UpgradeRequest, WebSocketServer};
use async_trait::async_trait;
use axum::extract::ws::{close_code, WebSocket};
use std::sync::Arc;

/// Device side of the inspector proxy.
pub const DEVICE_DEBUG_PATH: &str = "/inspector/device";

/// Debugger frontend side of the inspector proxy.
pub const DEBUGGER_PATH: &str = "/inspector/debug";

/// A WebSocket endpoint implemented outside this crate.
#[async_trait]
pub trait ExternalEndpoint: Send + Sync + 'static {
    /// Serve an accepted connection until it closes.
    async fn accept(&self, socket: WebSocket, request: UpgradeRequest);
}

/// Routes connections under a path prefix to an [`ExternalEndpoint`].
///
/// Without an endpoint the route still exists and every connection is
/// closed straight away with "going away".
pub struct WebSocketServerAdapter {
    name: &'static str,
    pattern: RoutePattern,
    endpoint: Option<Arc<dyn ExternalEndpoint>>,
}

impl WebSocketServerAdapter {
    pub fn new(
        name: &'static str,
        pattern: RoutePattern,
        endpoint: Option<Arc<dyn ExternalEndpoint>>,
    ) -> Self {
        Self {
            name,
            pattern,
            endpoint,
        }
    }

    /// Adapter for `/inspector/device`.
    pub fn device_debug(endpoint: Option<Arc<dyn ExternalEndpoint>>) -> Self {
        Self::new("device-debug", RoutePattern::prefix(DEVICE_DEBUG_PATH), endpoint)
    }

    /// Adapter for `/inspector/debug`.
    pub fn debugger(endpoint: Option<Arc<dyn ExternalEndpoint>>) -> Self {
        Self::new("debugger", RoutePattern::prefix(DEBUGGER_PATH), endpoint)
    }

    pub fn has_endpoint(&self) -> bool {
        self.endpoint.is_some()
    }
}

#[async_trait]
impl WebSocketServer for WebSocketServerAdapter {
    fn name(&self) -> &'static str {
        self.name
    }

    fn pattern(&self) -> RoutePattern {
        self.pattern.clone()
    }

    async fn on_connection(self: Arc<Self>, socket: WebSocket, request: UpgradeRequest) {
        match &self.endpoint {
            Some(endpoint) => endpoint.accept(socket, request).await,
            None => {
                tracing::debug!(server = self.name, path = %request.path, "no endpoint attached");
                close_with(socket, close_code::AWAY, "Endpoint not available").await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inspector_routes() {
        let device = WebSocketServerAdapter::device_debug(None);
        assert!(device.pattern().matches("/inspector/device"));
        assert!(device.pattern().matches("/inspector/device/page-1"));
        assert!(!device.has_endpoint());

        let debugger = WebSocketServerAdapter::debugger(None);
        assert_eq!(debugger.name(), "debugger");
        assert!(debugger.pattern().matches("/inspector/debug/ws"));
        assert!(!debugger.pattern().matches("/inspector/device"));
    }
}
