//! The contract the coordinator uses to announce build lifecycle events.
//!
//! The hosting server implements [`DelegateContext`] by composing its HMR and
//! message servers; the coordinator never touches connections directly.

use crate::stats::HmrBody;
use crate::target::Target;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a connected realtime client (e.g. `client#3`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClientId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ClientId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Events delivered to HMR clients.
///
/// Serialized as `{"action": "building"}` or
/// `{"action": "built", "body": {...}}`; `body` is `null` when no build has
/// completed yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "body", rename_all = "lowercase")]
pub enum HmrEvent {
    /// A rebuild started
    Building,
    /// A build completed
    Built(Option<HmrBody>),
    /// Initial state sent to a freshly connected client
    Sync(Option<HmrBody>),
}

/// A method-like event broadcast to every message client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEvent {
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl MessageEvent {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            params: None,
        }
    }

    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = Some(params);
        self
    }
}

/// Notification hub the coordinator reports into.
///
/// Implementations must not block: every method is called from the
/// coordinator's event loop.
pub trait DelegateContext: Send + Sync {
    /// A build started for `target`.
    fn notify_build_start(&self, target: &Target);

    /// A build finished for `target`.
    fn notify_build_end(&self, target: &Target);

    /// Send `event` to HMR clients of `target`.
    ///
    /// With `client_ids` set only those clients receive it; ids that are not
    /// connected are skipped.
    fn broadcast_to_hmr_clients(
        &self,
        event: &HmrEvent,
        target: &Target,
        client_ids: Option<&[ClientId]>,
    );

    /// Send `event` to every message client.
    fn broadcast_to_message_clients(&self, event: &MessageEvent);
}

/// A context that drops every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopContext;

impl DelegateContext for NoopContext {
    fn notify_build_start(&self, _target: &Target) {}

    fn notify_build_end(&self, _target: &Target) {}

    fn broadcast_to_hmr_clients(
        &self,
        _event: &HmrEvent,
        _target: &Target,
        _client_ids: Option<&[ClientId]>,
    ) {
    }

    fn broadcast_to_message_clients(&self, _event: &MessageEvent) {}
}
