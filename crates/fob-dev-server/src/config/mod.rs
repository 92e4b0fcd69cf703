//! Development server configuration.
//!
//! Loaded by layering, lowest priority first:
//!
//! 1. built-in defaults
//! 2. `fob.dev.json` in the working directory (or `--config <path>`)
//! 3. `FOB_DEV_HOST`, `FOB_DEV_PORT`, `FOB_DEV_STATUS`, `FOB_DEV_HELLO`
//! 4. command-line overrides

mod loading;
mod validation;

use fob_multi_compiler::{CompilerConfig, TargetConfig, WatchOptions};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub use loading::{CliOverrides, CONFIG_FILE_NAME, ENV_PREFIX};

/// Default text returned by `GET /status`.
pub const DEFAULT_STATUS: &str = "packager-status:running";

/// Default text returned by `GET /`.
pub const DEFAULT_HELLO: &str = "React Native packager is running";

/// Full server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DevServerConfig {
    /// Interface to bind
    pub host: String,

    /// Port to bind
    pub port: u16,

    /// Directory relative output directories are resolved against
    pub root_dir: PathBuf,

    /// Build targets
    #[serde(default)]
    pub targets: Vec<TargetConfig>,

    /// Watch mode options shared by every target
    #[serde(default)]
    pub watch: WatchOptions,

    /// Text served at `GET /status`
    pub status: String,

    /// Text served at `GET /`
    pub hello: String,
}

impl Default for DevServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8081,
            root_dir: PathBuf::from("."),
            targets: Vec::new(),
            watch: WatchOptions::default(),
            status: DEFAULT_STATUS.to_string(),
            hello: DEFAULT_HELLO.to_string(),
        }
    }
}

impl DevServerConfig {
    /// Build-coordinator view of this configuration.
    pub fn compiler_config(&self) -> CompilerConfig {
        CompilerConfig {
            targets: self.targets.clone(),
            watch: self.watch.clone(),
        }
    }

    /// `host:port` suitable for binding.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Base URL clients connect to.
    pub fn server_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}
