//! Narrow contracts the server calls into for behavior it does not own.
//!
//! Each delegate has a default implementation; [`Delegates`] bundles the
//! ones handed to [`DevServer::new`](crate::DevServer::new).

use crate::config::DevServerConfig;
use async_trait::async_trait;
use fob_multi_compiler::{
    AssetSummary, ClientId, CompilerError, HmrEvent, MultiCompiler, StatsSnapshot, Target,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, Weak};

/// Static texts served over HTTP.
pub trait MessagesDelegate: Send + Sync {
    /// Body of `GET /status`.
    fn status(&self) -> String;

    /// Body of `GET /`.
    fn hello(&self) -> String;
}

/// [`MessagesDelegate`] returning fixed strings.
#[derive(Debug, Clone)]
pub struct StaticMessages {
    pub status: String,
    pub hello: String,
}

impl StaticMessages {
    pub fn from_config(config: &DevServerConfig) -> Self {
        Self {
            status: config.status.clone(),
            hello: config.hello.clone(),
        }
    }
}

impl MessagesDelegate for StaticMessages {
    fn status(&self) -> String {
        self.status.clone()
    }

    fn hello(&self) -> String {
        self.hello.clone()
    }
}

/// A log record sent by a running app.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientLog {
    /// `trace`, `debug`, `info`, `log`, `warn` or `error`
    #[serde(default = "default_level")]
    pub level: String,

    /// Console arguments as sent by the app
    #[serde(default)]
    pub data: Vec<Value>,
}

fn default_level() -> String {
    "info".to_string()
}

impl ClientLog {
    /// Arguments joined the way a console would print them.
    pub fn message(&self) -> String {
        self.data
            .iter()
            .map(|value| match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Receives logs from connected apps.
pub trait LoggerDelegate: Send + Sync {
    fn on_client_log(&self, client: &ClientId, log: &ClientLog);
}

/// [`LoggerDelegate`] re-emitting app logs as `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl LoggerDelegate for TracingLogger {
    fn on_client_log(&self, client: &ClientId, log: &ClientLog) {
        let message = log.message();
        match log.level.as_str() {
            "error" => tracing::error!(client = %client, "{}", message),
            "warn" => tracing::warn!(client = %client, "{}", message),
            "debug" | "trace" => tracing::debug!(client = %client, "{}", message),
            _ => tracing::info!(client = %client, "{}", message),
        }
    }
}

/// Hooks into the HMR namespace.
pub trait HmrDelegate: Send + Sync {
    /// Called for every new HMR client. A returned event is sent to that
    /// client only.
    fn on_client_connected(&self, target: &Target, client_id: &ClientId) -> Option<HmrEvent>;

    /// Called for every text message an HMR client sends.
    fn on_client_message(&self, target: &Target, client_id: &ClientId, message: &str) {
        tracing::debug!(platform = %target, client = %client_id, "hmr client message: {}", message);
    }
}

/// [`HmrDelegate`] that syncs new clients with the last build of their target.
///
/// Holds the compiler weakly: the compiler owns the notification hub, which
/// owns the HMR server and this delegate.
pub struct CompilerHmrDelegate {
    compiler: Weak<MultiCompiler>,
}

impl CompilerHmrDelegate {
    pub fn new(compiler: &Arc<MultiCompiler>) -> Self {
        Self {
            compiler: Arc::downgrade(compiler),
        }
    }
}

impl HmrDelegate for CompilerHmrDelegate {
    fn on_client_connected(&self, target: &Target, _client_id: &ClientId) -> Option<HmrEvent> {
        let compiler = self.compiler.upgrade()?;
        Some(HmrEvent::Sync(compiler.hmr_body(target)))
    }
}

/// Data behind the API namespace and `/api/*` routes.
#[async_trait]
pub trait ApiDelegate: Send + Sync {
    async fn get_platforms(&self) -> Result<Vec<Target>, CompilerError>;

    async fn get_assets(&self, target: &Target) -> Result<Vec<AssetSummary>, CompilerError>;

    async fn get_stats(&self, target: &Target) -> Result<Option<StatsSnapshot>, CompilerError>;
}

/// [`ApiDelegate`] reading straight from the build coordinator.
pub struct CompilerApi {
    compiler: Arc<MultiCompiler>,
}

impl CompilerApi {
    pub fn new(compiler: Arc<MultiCompiler>) -> Self {
        Self { compiler }
    }
}

#[async_trait]
impl ApiDelegate for CompilerApi {
    async fn get_platforms(&self) -> Result<Vec<Target>, CompilerError> {
        Ok(self.compiler.targets().to_vec())
    }

    async fn get_assets(&self, target: &Target) -> Result<Vec<AssetSummary>, CompilerError> {
        self.compiler.list_assets(target)
    }

    async fn get_stats(&self, target: &Target) -> Result<Option<StatsSnapshot>, CompilerError> {
        self.compiler.get_stats_snapshot(target)
    }
}

/// Delegates supplied by the embedder. Unset ones fall back to the defaults
/// built over the compiler.
pub struct Delegates {
    pub messages: Arc<dyn MessagesDelegate>,
    pub logger: Arc<dyn LoggerDelegate>,
    pub hmr: Option<Arc<dyn HmrDelegate>>,
    pub api: Option<Arc<dyn ApiDelegate>>,
}

impl Delegates {
    /// Default delegates for a configuration.
    pub fn from_config(config: &DevServerConfig) -> Self {
        Self {
            messages: Arc::new(StaticMessages::from_config(config)),
            logger: Arc::new(TracingLogger),
            hmr: None,
            api: None,
        }
    }
}
