//! Fob dev server - multi-target development server.
//!
//! Hosts a [`MultiCompiler`](fob_multi_compiler::MultiCompiler) and exposes
//! its artifacts over HTTP, plus several WebSocket namespaces on the same
//! port:
//!
//! - `/hmr` - hot module replacement events per target
//! - `/message` - peer-to-peer messaging between tools and apps
//! - `/events` - build events and message traffic for external tooling
//! - `/api-ws` - build introspection (also under `/api/*` over HTTP)
//! - `/__client` - log forwarding from running apps
//! - `/inspector/device`, `/inspector/debug` - externally provided endpoints
//!
//! # Architecture
//!
//! - [`config`] - Layered configuration (defaults, file, env, CLI)
//! - [`wss`] - Upgrade routing and the protocol sub-servers
//! - [`context`] - The notification hub the compiler reports into
//! - [`delegate`] - Pluggable behavior (status texts, logs, HMR sync, API)
//! - [`http`] - Status and artifact routes
//! - [`server`] - Assembly of all of the above
//!
//! # Example
//!
//! ```rust,no_run
//! use fob_dev_server::{DevServer, DevServerConfig, Delegates, ExternalEndpoints};
//! use fob_multi_compiler::{OutputDirEngine, TargetConfig};
//! use std::sync::Arc;
//!
//! # async fn run() -> fob_dev_server::Result<()> {
//! let config = DevServerConfig {
//!     targets: vec![TargetConfig::new("ios", "build/ios")],
//!     ..DevServerConfig::default()
//! };
//! let delegates = Delegates::from_config(&config);
//! let engine = Arc::new(OutputDirEngine::new("."));
//! DevServer::new(config, engine, delegates, ExternalEndpoints::default())?
//!     .run()
//!     .await
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod context;
pub mod delegate;
pub mod error;
pub mod http;
pub mod logger;
pub mod server;
pub mod ui;
pub mod wss;

pub use config::DevServerConfig;
pub use context::ServerContext;
pub use delegate::{
    ApiDelegate, ClientLog, Delegates, HmrDelegate, LoggerDelegate, MessagesDelegate,
};
pub use error::{ConfigError, DevServerError, Result, RoutingError};
pub use server::{DevServer, ExternalEndpoints};
