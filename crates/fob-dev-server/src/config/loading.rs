use crate::config::DevServerConfig;
use crate::error::{ConfigError, Result};
use figment::{
    providers::{Env, Format as _, Json, Serialized},
    Figment,
};
use fob_multi_compiler::TargetConfig;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Config file looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "fob.dev.json";

/// Prefix of environment variables merged into the configuration.
pub const ENV_PREFIX: &str = "FOB_DEV_";

/// Values given on the command line. Unset fields leave lower layers alone.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CliOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_dir: Option<PathBuf>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<TargetConfig>,
}

impl DevServerConfig {
    /// Load configuration from every source.
    ///
    /// Priority: CLI overrides > environment variables > config file > defaults.
    ///
    /// # Arguments
    ///
    /// * `config_path` - Explicit config file; must exist when given
    /// * `cwd` - Directory searched for `fob.dev.json` when no path is given
    /// * `overrides` - Values from the command line
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotFound`] for a missing explicit file,
    /// [`ConfigError::Load`] when sources cannot be merged, and any
    /// validation error.
    pub fn load(config_path: Option<&Path>, cwd: &Path, overrides: &CliOverrides) -> Result<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(Self::default()));

        let config_file = match config_path {
            Some(path) if !path.exists() => {
                return Err(ConfigError::NotFound(path.to_path_buf()).into());
            }
            Some(path) => Some(path.to_path_buf()),
            None => {
                let default_path = cwd.join(CONFIG_FILE_NAME);
                default_path.exists().then_some(default_path)
            }
        };

        if let Some(path) = config_file {
            tracing::debug!(path = %path.display(), "loading config file");
            figment = figment.merge(Json::file(path));
        }

        // Only single-word keys: env keys are lowercased, config keys are camelCase.
        figment = figment.merge(Env::prefixed(ENV_PREFIX).only(&["host", "port", "status", "hello"]));

        figment = figment.merge(Serialized::defaults(overrides));

        let mut config: Self = figment
            .extract()
            .map_err(|e| ConfigError::Load(e.to_string()))?;

        if config.root_dir.is_relative() {
            config.root_dir = cwd.join(&config.root_dir);
        }

        config.validate()?;
        Ok(config)
    }
}
