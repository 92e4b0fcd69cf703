//! The notification hub handed to the build coordinator.

use crate::wss::servers::{EventsServer, HmrServer, MessageServer};
use fob_multi_compiler::{ClientId, DelegateContext, HmrEvent, MessageEvent, Target};
use serde_json::json;
use std::sync::Arc;

/// Composes the HMR, message and events servers into a [`DelegateContext`].
pub struct ServerContext {
    hmr: Arc<HmrServer>,
    messages: Arc<MessageServer>,
    events: Arc<EventsServer>,
}

impl ServerContext {
    pub fn new(hmr: Arc<HmrServer>, messages: Arc<MessageServer>, events: Arc<EventsServer>) -> Self {
        Self {
            hmr,
            messages,
            events,
        }
    }
}

impl DelegateContext for ServerContext {
    fn notify_build_start(&self, target: &Target) {
        tracing::info!(platform = %target, "build started");
        self.events
            .broadcast_event(json!({ "type": "BuildStart", "platform": target }));
    }

    fn notify_build_end(&self, target: &Target) {
        tracing::info!(platform = %target, "build finished");
        self.events
            .broadcast_event(json!({ "type": "BuildEnd", "platform": target }));
    }

    fn broadcast_to_hmr_clients(
        &self,
        event: &HmrEvent,
        target: &Target,
        client_ids: Option<&[ClientId]>,
    ) {
        let reached = self.hmr.send(event, target, client_ids);
        tracing::trace!(platform = %target, reached, "hmr event sent");
    }

    fn broadcast_to_message_clients(&self, event: &MessageEvent) {
        self.messages.broadcast(&event.method, event.params.clone());
    }
}
