use crate::config::DevServerConfig;
use crate::error::{ConfigError, Result};
use std::collections::HashSet;

/// Upper bound for the watch debounce window.
const MAX_AGGREGATE_TIMEOUT_MS: u64 = 60_000;

impl DevServerConfig {
    /// Validate configuration for logical consistency.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "host".to_string(),
                value: "".to_string(),
                hint: "Use an interface address such as 127.0.0.1 or 0.0.0.0".to_string(),
            }
            .into());
        }

        if self.targets.is_empty() {
            return Err(ConfigError::MissingField {
                field: "targets".to_string(),
                hint: "Add at least one target to fob.dev.json or pass --target <name>".to_string(),
            }
            .into());
        }

        let mut seen = HashSet::new();
        for target in &self.targets {
            let name = target.name.as_str();
            if name.trim().is_empty() || name.contains(['/', '\\', '?', '&']) {
                return Err(ConfigError::InvalidValue {
                    field: "targets[].name".to_string(),
                    value: name.to_string(),
                    hint: "Target names must be non-empty and URL safe (e.g. android, ios)"
                        .to_string(),
                }
                .into());
            }
            if !seen.insert(name) {
                return Err(ConfigError::InvalidValue {
                    field: "targets[].name".to_string(),
                    value: name.to_string(),
                    hint: "Each target can only be configured once".to_string(),
                }
                .into());
            }
        }

        if self.watch.aggregate_timeout_ms > MAX_AGGREGATE_TIMEOUT_MS {
            return Err(ConfigError::InvalidValue {
                field: "watch.aggregateTimeoutMs".to_string(),
                value: self.watch.aggregate_timeout_ms.to_string(),
                hint: format!("Use at most {} milliseconds", MAX_AGGREGATE_TIMEOUT_MS),
            }
            .into());
        }

        Ok(())
    }
}
