//! The build engine contract.
//!
//! A [`BuildEngine`] constructs one [`TargetPipeline`] per target. Pipelines
//! run continuously once [`TargetPipeline::watch`] is called and report their
//! lifecycle through a [`BuildEventSink`].

mod output_dir;

pub use output_dir::OutputDirEngine;

use crate::config::{TargetConfig, WatchOptions};
use crate::error::{BuildFailure, ConfigurationError};
use crate::event::BuildEventSink;

/// Factory for per-target pipelines.
pub trait BuildEngine: Send + Sync {
    /// Construct the pipeline for one target.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] if the target cannot be built with
    /// this engine. Construction never fails asynchronously.
    fn create_pipeline(
        &self,
        config: &TargetConfig,
    ) -> Result<Box<dyn TargetPipeline>, ConfigurationError>;
}

/// A long-running build for a single target.
pub trait TargetPipeline: Send {
    /// Begin continuous builds.
    ///
    /// Called from within a tokio runtime. The pipeline keeps `sink` and
    /// emits `Started`, then `Completed`/`Failed` for every build, with
    /// `Invalidated` before each rebuild. Errors that happen after this call
    /// returns go through [`BuildEventSink::watch_failed`].
    ///
    /// # Errors
    ///
    /// Returns a [`BuildFailure`] if watching cannot start at all.
    fn watch(&mut self, options: &WatchOptions, sink: BuildEventSink) -> Result<(), BuildFailure>;
}
