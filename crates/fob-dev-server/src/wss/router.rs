//! Path-based dispatch of WebSocket upgrades.

use crate::error::RoutingError;
use crate::wss::{RoutePattern, UpgradeRequest, WebSocketServer};
use axum::{
    extract::{ws::WebSocketUpgrade, FromRequestParts, Query, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::HashMap;
use std::sync::Arc;

/// Maps upgrade paths to sub-servers.
///
/// Routes are registered up front; [`freeze`](Self::freeze) ends
/// registration and the router is shared read-only afterwards. The router
/// keeps no per-connection state.
#[derive(Default)]
pub struct WebSocketRouter {
    exact: HashMap<String, Arc<dyn WebSocketServer>>,
    /// Longest prefix first
    prefixes: Vec<(RoutePattern, Arc<dyn WebSocketServer>)>,
    frozen: bool,
}

impl WebSocketRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a server under its own pattern.
    ///
    /// # Errors
    ///
    /// [`RoutingError::DuplicatePath`] if another exact or prefix route
    /// already claims the path, and
    /// [`RoutingError::Frozen`] after [`freeze`](Self::freeze).
    pub fn register_server(&mut self, server: Arc<dyn WebSocketServer>) -> Result<(), RoutingError> {
        if self.frozen {
            return Err(RoutingError::Frozen(server.name().to_string()));
        }

        let pattern = server.pattern();
        let existing = self.exact.get(pattern.path()).or_else(|| {
            self.prefixes
                .iter()
                .find(|(registered, _)| registered.path() == pattern.path())
                .map(|(_, server)| server)
        });
        if let Some(existing) = existing {
            return Err(RoutingError::DuplicatePath {
                path: pattern.path().to_string(),
                existing: existing.name().to_string(),
            });
        }

        tracing::debug!(server = server.name(), path = pattern.path(), "registered websocket server");
        match pattern {
            RoutePattern::Exact(path) => {
                self.exact.insert(path, server);
            }
            prefix @ RoutePattern::Prefix(_) => {
                self.prefixes.push((prefix, server));
                self.prefixes
                    .sort_by(|a, b| b.0.path().len().cmp(&a.0.path().len()));
            }
        }
        Ok(())
    }

    /// End registration.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    /// Find the server for `path`: exact match first, then longest prefix.
    pub fn resolve(&self, path: &str) -> Option<Arc<dyn WebSocketServer>> {
        if let Some(server) = self.exact.get(path) {
            return Some(Arc::clone(server));
        }

        self.prefixes
            .iter()
            .find(|(pattern, _)| pattern.matches(path))
            .map(|(_, server)| Arc::clone(server))
    }

    /// Registered paths, exact routes first, sorted.
    pub fn paths(&self) -> Vec<String> {
        let mut exact: Vec<String> = self.exact.keys().cloned().collect();
        exact.sort();
        let mut prefixes: Vec<String> = self
            .prefixes
            .iter()
            .map(|(pattern, _)| format!("{}/*", pattern.path()))
            .collect();
        prefixes.sort();
        exact.extend(prefixes);
        exact
    }
}

fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    headers
        .get(header::UPGRADE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.eq_ignore_ascii_case("websocket"))
}

/// Intercept WebSocket upgrade requests and hand them to the routed server.
///
/// Requests without `Upgrade: websocket` continue to the HTTP routes. An
/// upgrade for a path nobody serves is answered with `404` and never
/// upgraded.
pub async fn upgrade_middleware(
    State(router): State<Arc<WebSocketRouter>>,
    request: Request,
    next: Next,
) -> Response {
    if !is_websocket_upgrade(request.headers()) {
        return next.run(request).await;
    }

    let path = request.uri().path().to_string();
    let Some(server) = router.resolve(&path) else {
        tracing::debug!(path = %path, "no websocket server for path");
        return StatusCode::NOT_FOUND.into_response();
    };

    let query = Query::<HashMap<String, String>>::try_from_uri(request.uri())
        .map(|Query(query)| query)
        .unwrap_or_default();

    let (mut parts, _body) = request.into_parts();
    let upgrade = match WebSocketUpgrade::from_request_parts(&mut parts, &()).await {
        Ok(upgrade) => upgrade,
        Err(rejection) => return rejection.into_response(),
    };

    tracing::debug!(server = server.name(), path = %path, "accepting websocket connection");
    let request = UpgradeRequest { path, query };
    upgrade.on_upgrade(move |socket| server.on_connection(socket, request))
}
