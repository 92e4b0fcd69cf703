//! Build summaries.

use crate::asset::AssetSummary;
use serde::{Deserialize, Serialize};

/// A warning or error reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildMessage {
    /// Human readable message
    pub message: String,

    /// Module the message refers to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_name: Option<String>,

    /// Extra engine-specific details (stack, code frame, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl BuildMessage {
    /// Create a message without module information.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            module_name: None,
            details: None,
        }
    }

    /// Attach the module the message refers to.
    pub fn in_module(mut self, module_name: impl Into<String>) -> Self {
        self.module_name = Some(module_name.into());
        self
    }
}

/// Summary of the last completed build of a target.
///
/// Replaced wholesale on every completed build, never merged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    /// Compilation name
    pub name: String,
    /// Build duration in milliseconds
    pub time: u64,
    /// Content hash of the build
    pub hash: String,
    /// Warnings in engine order
    pub warnings: Vec<BuildMessage>,
    /// Errors in engine order
    pub errors: Vec<BuildMessage>,
    /// Assets emitted by this build
    pub assets: Vec<AssetSummary>,
}

impl StatsSnapshot {
    /// Derive the body of a `built`/`sync` HMR event.
    pub fn hmr_body(&self) -> HmrBody {
        HmrBody {
            name: self.name.clone(),
            time: self.time,
            hash: self.hash.clone(),
            warnings: self.warnings.clone(),
            errors: self.errors.clone(),
        }
    }
}

/// Payload HMR clients receive after a build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HmrBody {
    pub name: String,
    pub time: u64,
    pub hash: String,
    pub warnings: Vec<BuildMessage>,
    pub errors: Vec<BuildMessage>,
}
