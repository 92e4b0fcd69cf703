//! Lifecycle events emitted by target pipelines.

use crate::asset::{Asset, AssetSummary};
use crate::error::BuildFailure;
use crate::stats::{BuildMessage, StatsSnapshot};
use crate::target::Target;
use tokio::sync::mpsc;

/// The result of a finished build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildOutput {
    /// Compilation name
    pub name: String,
    /// Build duration in milliseconds
    pub time: u64,
    /// Content hash
    pub hash: String,
    /// Warnings in engine order
    pub warnings: Vec<BuildMessage>,
    /// Errors in engine order
    pub errors: Vec<BuildMessage>,
    /// Emitted assets, keyed by engine-reported name
    pub assets: Vec<(String, Asset)>,
}

impl BuildOutput {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.hash = hash.into();
        self
    }

    pub fn with_time(mut self, time: u64) -> Self {
        self.time = time;
        self
    }

    pub fn with_asset(mut self, name: impl Into<String>, asset: Asset) -> Self {
        self.assets.push((name.into(), asset));
        self
    }

    pub fn with_warning(mut self, warning: BuildMessage) -> Self {
        self.warnings.push(warning);
        self
    }

    pub fn with_error(mut self, error: BuildMessage) -> Self {
        self.errors.push(error);
        self
    }

    /// Split into the stats snapshot and the assets to merge.
    pub(crate) fn into_parts(self) -> (StatsSnapshot, Vec<(String, Asset)>) {
        let summaries = self
            .assets
            .iter()
            .map(|(name, asset)| AssetSummary {
                name: crate::asset::adapt_filename_to_platform(name),
                size: asset.size,
                hot_module_replacement: asset.is_hot_update(),
            })
            .collect();

        let snapshot = StatsSnapshot {
            name: self.name,
            time: self.time,
            hash: self.hash,
            warnings: self.warnings,
            errors: self.errors,
            assets: summaries,
        };

        (snapshot, self.assets)
    }
}

/// Lifecycle of a single target's build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildEvent {
    /// Watch mode started its first build
    Started,
    /// A change invalidated the previous build and a rebuild began
    Invalidated,
    /// The build finished (possibly with warnings/errors in the output)
    Completed(BuildOutput),
    /// The engine hit a fatal error
    Failed(BuildFailure),
}

impl BuildEvent {
    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            BuildEvent::Started => "started",
            BuildEvent::Invalidated => "invalidated",
            BuildEvent::Completed(_) => "completed",
            BuildEvent::Failed(_) => "failed",
        }
    }
}

/// Messages flowing from pipelines into the coordinator's event loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineMessage {
    /// A lifecycle event for one target
    Build { target: Target, event: BuildEvent },
    /// The watcher itself broke; every waiting request is rejected
    WatchFailed(BuildFailure),
}

/// Handle a pipeline uses to report events for its target.
#[derive(Debug, Clone)]
pub struct BuildEventSink {
    target: Target,
    tx: mpsc::UnboundedSender<PipelineMessage>,
}

impl BuildEventSink {
    pub(crate) fn new(target: Target, tx: mpsc::UnboundedSender<PipelineMessage>) -> Self {
        Self { target, tx }
    }

    /// Create a sink whose events go to the returned receiver instead of a
    /// coordinator. Useful for driving an engine on its own.
    pub fn detached(target: Target) -> (Self, mpsc::UnboundedReceiver<PipelineMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(target, tx), rx)
    }

    /// Target this sink reports for.
    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Report a lifecycle event.
    ///
    /// Returns `false` once the coordinator has shut down.
    pub fn emit(&self, event: BuildEvent) -> bool {
        tracing::trace!(platform = %self.target, event = event.kind(), "pipeline event");
        self.tx
            .send(PipelineMessage::Build {
                target: self.target.clone(),
                event,
            })
            .is_ok()
    }

    /// Report that watching failed altogether.
    pub fn watch_failed(&self, failure: BuildFailure) -> bool {
        self.tx.send(PipelineMessage::WatchFailed(failure)).is_ok()
    }

    /// Whether the coordinator is still listening.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_parts_builds_snapshot() {
        let output = BuildOutput::new("android")
            .with_hash("deadbeef")
            .with_time(42)
            .with_asset("index.bundle", Asset::new("code"))
            .with_asset("hot\\1.hot-update.js", Asset::hot_update("hmr"))
            .with_error(BuildMessage::new("Module not found"));

        let (snapshot, assets) = output.into_parts();
        assert_eq!(snapshot.hash, "deadbeef");
        assert_eq!(snapshot.errors.len(), 1);
        assert_eq!(snapshot.assets[1].name, "hot/1.hot-update.js");
        assert!(snapshot.assets[1].hot_module_replacement);
        assert_eq!(assets.len(), 2);
    }

    #[test]
    fn test_detached_sink_delivers_events() {
        let (sink, mut rx) = BuildEventSink::detached(Target::from("ios"));
        assert!(sink.emit(BuildEvent::Started));
        assert!(sink.watch_failed(BuildFailure::new("watcher died")));

        assert_eq!(
            rx.try_recv().unwrap(),
            PipelineMessage::Build {
                target: Target::from("ios"),
                event: BuildEvent::Started,
            }
        );
        assert!(matches!(rx.try_recv().unwrap(), PipelineMessage::WatchFailed(_)));

        drop(rx);
        assert!(!sink.emit(BuildEvent::Invalidated));
        assert!(sink.is_closed());
    }
}
