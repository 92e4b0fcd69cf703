//! Protocol sub-servers, one per WebSocket namespace.

mod adapter;
mod api;
mod dev_client;
mod events;
mod hmr;
mod message;

pub use adapter::{ExternalEndpoint, WebSocketServerAdapter, DEBUGGER_PATH, DEVICE_DEBUG_PATH};
pub use api::{ApiServer, API_PATH};
pub use dev_client::{DevClientServer, DEV_CLIENT_PATH};
pub use events::{EventsServer, EVENTS_PATH};
pub use hmr::{HmrServer, HMR_PATH};
pub use message::{MessageServer, MESSAGE_PATH, PROTOCOL_VERSION};
