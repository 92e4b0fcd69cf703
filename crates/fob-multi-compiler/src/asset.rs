//! In-memory build artifacts.
//!
//! Every target keeps an [`AssetCache`] holding the output of its last full
//! build plus the most recent hot-update chunks. Hot-update chunks only live
//! until the next successful build.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Metadata reported by the engine for an emitted asset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetInfo {
    /// Asset only exists to deliver a hot update
    #[serde(default)]
    pub hot_module_replacement: bool,

    /// Name of the source map emitted alongside this asset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_source_map: Option<String>,
}

/// A named build output held in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    /// Raw file contents
    pub data: Vec<u8>,
    /// Engine metadata
    pub info: AssetInfo,
    /// Size in bytes
    pub size: u64,
}

impl Asset {
    /// Create a regular (non hot-update) asset.
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self::with_info(data, AssetInfo::default())
    }

    /// Create an asset that only exists to deliver a hot update.
    pub fn hot_update(data: impl Into<Vec<u8>>) -> Self {
        Self::with_info(
            data,
            AssetInfo {
                hot_module_replacement: true,
                ..AssetInfo::default()
            },
        )
    }

    /// Create an asset with explicit metadata.
    pub fn with_info(data: impl Into<Vec<u8>>, info: AssetInfo) -> Self {
        let data = data.into();
        let size = data.len() as u64;
        Self { data, info, size }
    }

    /// Whether the asset is dropped at the next completed build.
    pub fn is_hot_update(&self) -> bool {
        self.info.hot_module_replacement
    }
}

/// Name and size of a cached asset, as exposed to API clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetSummary {
    /// Artifact name
    pub name: String,
    /// Size in bytes
    pub size: u64,
    /// Whether the asset is a hot-update chunk
    #[serde(default)]
    pub hot_module_replacement: bool,
}

/// Adapt an engine-reported asset name to the name clients request.
///
/// Engines report paths with the host separator; clients always use `/`.
pub fn adapt_filename_to_platform(name: &str) -> String {
    name.replace('\\', "/")
}

/// Per-target artifact store.
#[derive(Debug, Clone, Default)]
pub struct AssetCache {
    assets: HashMap<String, Asset>,
}

impl AssetCache {
    /// Create a new empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get an asset by its client-visible name.
    pub fn get(&self, name: &str) -> Option<&Asset> {
        self.assets.get(name)
    }

    /// Check whether an asset is cached.
    pub fn contains(&self, name: &str) -> bool {
        self.assets.contains_key(name)
    }

    /// Number of cached assets.
    pub fn len(&self) -> usize {
        self.assets.len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// Cached names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.assets.keys().cloned().collect();
        names.sort();
        names
    }

    /// Merge the output of a completed build.
    ///
    /// Hot-update entries from earlier builds are purged first; every other
    /// entry survives unless the new build emits the same name.
    pub fn apply_build<I>(&mut self, assets: I)
    where
        I: IntoIterator<Item = (String, Asset)>,
    {
        self.assets.retain(|_, asset| !asset.is_hot_update());

        for (name, asset) in assets {
            self.assets.insert(adapt_filename_to_platform(&name), asset);
        }
    }

    /// Name/size listing of every cached asset, sorted by name.
    pub fn summaries(&self) -> Vec<AssetSummary> {
        let mut summaries: Vec<AssetSummary> = self
            .assets
            .iter()
            .map(|(name, asset)| AssetSummary {
                name: name.clone(),
                size: asset.size,
                hot_module_replacement: asset.is_hot_update(),
            })
            .collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        summaries
    }
}
