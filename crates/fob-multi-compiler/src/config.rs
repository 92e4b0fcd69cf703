//! Build configuration handed to the engine, one entry per target.

use crate::error::ConfigurationError;
use crate::target::Target;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

fn default_aggregate_timeout_ms() -> u64 {
    100
}

/// Options for continuous (watch mode) builds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WatchOptions {
    /// Delay after the first change before rebuilding, batching later changes
    #[serde(default = "default_aggregate_timeout_ms")]
    pub aggregate_timeout_ms: u64,

    /// File name fragments that never trigger a rebuild
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ignored: Vec<String>,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            aggregate_timeout_ms: default_aggregate_timeout_ms(),
            ignored: Vec::new(),
        }
    }
}

impl WatchOptions {
    /// Debounce window as a `Duration`.
    pub fn aggregate_timeout(&self) -> Duration {
        Duration::from_millis(self.aggregate_timeout_ms)
    }
}

/// Target-specific build configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TargetConfig {
    /// Target name (e.g. "android")
    pub name: Target,

    /// Directory the engine writes this target's output to
    pub output_dir: PathBuf,
}

impl TargetConfig {
    pub fn new(name: impl Into<Target>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            output_dir: output_dir.into(),
        }
    }
}

/// Configuration for a whole [`MultiCompiler`](crate::MultiCompiler).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CompilerConfig {
    /// One entry per target, in pipeline creation order
    pub targets: Vec<TargetConfig>,

    /// Watch mode options shared by every pipeline
    #[serde(default)]
    pub watch: WatchOptions,
}

impl CompilerConfig {
    pub fn new(targets: Vec<TargetConfig>) -> Self {
        Self {
            targets,
            watch: WatchOptions::default(),
        }
    }

    /// Target names in configuration order.
    pub fn target_names(&self) -> Vec<Target> {
        self.targets.iter().map(|t| t.name.clone()).collect()
    }

    /// Validate the target set.
    ///
    /// # Errors
    ///
    /// Returns an error if no targets are configured, a name is empty, or a
    /// name appears twice.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.targets.is_empty() {
            return Err(ConfigurationError::NoTargets);
        }

        let mut seen = HashSet::new();
        for target in &self.targets {
            if target.name.as_str().trim().is_empty() {
                return Err(ConfigurationError::EmptyTargetName);
            }
            if !seen.insert(&target.name) {
                return Err(ConfigurationError::DuplicateTarget(target.name.clone()));
            }
        }

        Ok(())
    }
}
