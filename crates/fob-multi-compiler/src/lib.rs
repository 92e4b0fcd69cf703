//! Multi-target build coordination for the Fob development server.
//!
//! A development session builds the same project for several deployment
//! targets at once (for example `android` and `ios`). Each target gets its own
//! long-running [`TargetPipeline`], and the [`MultiCompiler`] sits on top of
//! all of them:
//!
//! - consumes the lifecycle events every pipeline emits ([`BuildEvent`])
//! - keeps a per-target in-memory [`AssetCache`] and [`StatsSnapshot`]
//! - lets request handlers wait for an in-flight build via
//!   [`MultiCompiler::get_artifact`]
//! - announces build start/end and HMR events through a [`DelegateContext`]
//!
//! The bundling engine itself is opaque: anything implementing
//! [`BuildEngine`] can drive the coordinator. [`OutputDirEngine`] is the
//! bundled implementation, which watches per-target output directories
//! written by an external bundler.
//!
//! # Example
//!
//! ```rust,no_run
//! use fob_multi_compiler::{
//!     CompilerConfig, MultiCompiler, NoopContext, OutputDirEngine, TargetConfig, Target,
//! };
//! use std::sync::Arc;
//!
//! # async fn run() -> fob_multi_compiler::Result<()> {
//! let config = CompilerConfig::new(vec![
//!     TargetConfig::new("android", "build/android"),
//!     TargetConfig::new("ios", "build/ios"),
//! ]);
//! let compiler = Arc::new(MultiCompiler::new(config, Arc::new(OutputDirEngine::new(".")))?);
//! compiler.initialize(Arc::new(NoopContext))?;
//! compiler.start_watching()?;
//!
//! let bundle = compiler
//!     .get_artifact("index.bundle", &Target::from("android"))
//!     .await?;
//! println!("{} bytes", bundle.size);
//! # Ok(())
//! # }
//! ```

pub mod asset;
pub mod compiler;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod event;
pub mod mime;
pub mod stats;
pub mod target;

pub use asset::{adapt_filename_to_platform, Asset, AssetCache, AssetInfo, AssetSummary};
pub use compiler::MultiCompiler;
pub use config::{CompilerConfig, TargetConfig, WatchOptions};
pub use context::{ClientId, DelegateContext, HmrEvent, MessageEvent, NoopContext};
pub use engine::{BuildEngine, OutputDirEngine, TargetPipeline};
pub use error::{BuildFailure, CompilerError, ConfigurationError, Result};
pub use event::{BuildEvent, BuildEventSink, BuildOutput, PipelineMessage};
pub use mime::{get_mime_type, infer_target, is_bundle};
pub use stats::{BuildMessage, HmrBody, StatsSnapshot};
pub use target::Target;
