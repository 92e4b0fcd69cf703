//! The multi-target build coordinator.
//!
//! Owns one [`TargetPipeline`] per target and the per-target state they feed:
//! build state, asset cache, last stats snapshot and the queue of requests
//! waiting for the next build. All state sits behind a single lock and is
//! only mutated by [`MultiCompiler::handle_event`], which the event loop
//! spawned by [`MultiCompiler::start_watching`] calls for every pipeline
//! message in arrival order.

use crate::asset::{Asset, AssetCache, AssetSummary};
use crate::config::CompilerConfig;
use crate::context::{DelegateContext, HmrEvent};
use crate::engine::{BuildEngine, TargetPipeline};
use crate::error::{BuildFailure, CompilerError, Result};
use crate::event::{BuildEvent, BuildEventSink, BuildOutput, PipelineMessage};
use crate::stats::{BuildMessage, HmrBody, StatsSnapshot};
use crate::target::Target;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, OnceLock, Weak};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Continuation run when the next build of a target settles, with either the
/// updated cache or the failure.
type Waiter = Box<dyn FnOnce(std::result::Result<&AssetCache, &BuildFailure>) + Send>;

/// Mutable state of one target.
#[derive(Default)]
struct TargetState {
    in_progress: bool,
    assets: AssetCache,
    stats: Option<StatsSnapshot>,
    pending: VecDeque<Waiter>,
}

impl TargetState {
    /// Drain and run every waiter in FIFO order.
    fn settle(&mut self, outcome: std::result::Result<(), &BuildFailure>) {
        let waiters = std::mem::take(&mut self.pending);
        for waiter in waiters {
            match outcome {
                Ok(()) => waiter(Ok(&self.assets)),
                Err(failure) => waiter(Err(failure)),
            }
        }
    }
}

/// Outcome of the synchronous part of an artifact lookup.
enum Lookup {
    Ready(Result<Asset>),
    Waiting(oneshot::Receiver<Result<Asset>>),
}

/// Coordinates N independent target pipelines.
///
/// Lifecycle: [`new`](Self::new) → [`initialize`](Self::initialize) →
/// [`start_watching`](Self::start_watching). Lookups work from construction
/// on; they simply find nothing until a build completes.
pub struct MultiCompiler {
    config: CompilerConfig,
    engine: Arc<dyn BuildEngine>,
    targets: Vec<Target>,
    state: Mutex<HashMap<Target, TargetState>>,
    context: OnceLock<Arc<dyn DelegateContext>>,
    pipelines: Mutex<Vec<(Target, Box<dyn TargetPipeline>)>>,
    event_loop: Mutex<Option<JoinHandle<()>>>,
}

impl MultiCompiler {
    /// Create a coordinator with empty state for every configured target.
    ///
    /// # Errors
    ///
    /// Returns [`CompilerError::Configuration`] if no targets are configured
    /// or a target name is empty or duplicated.
    pub fn new(config: CompilerConfig, engine: Arc<dyn BuildEngine>) -> Result<Self> {
        config.validate()?;

        let targets = config.target_names();
        let state = targets
            .iter()
            .map(|target| (target.clone(), TargetState::default()))
            .collect();

        Ok(Self {
            config,
            engine,
            targets,
            state: Mutex::new(state),
            context: OnceLock::new(),
            pipelines: Mutex::new(Vec::new()),
            event_loop: Mutex::new(None),
        })
    }

    /// Configured targets, in configuration order.
    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    /// The configuration this compiler was created with.
    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Create one pipeline per target and wire the notification context.
    ///
    /// # Errors
    ///
    /// Returns [`CompilerError::Configuration`] if the engine cannot
    /// construct a pipeline, and [`CompilerError::AlreadyInitialized`] on a
    /// second call.
    pub fn initialize(&self, context: Arc<dyn DelegateContext>) -> Result<()> {
        if self.context.get().is_some() {
            return Err(CompilerError::AlreadyInitialized);
        }

        let mut pipelines = Vec::with_capacity(self.config.targets.len());
        for target_config in &self.config.targets {
            let pipeline = self.engine.create_pipeline(target_config)?;
            tracing::debug!(platform = %target_config.name, "created build pipeline");
            pipelines.push((target_config.name.clone(), pipeline));
        }

        self.context
            .set(context)
            .map_err(|_| CompilerError::AlreadyInitialized)?;
        *self.pipelines.lock() = pipelines;
        Ok(())
    }

    /// Start continuous builds on every pipeline.
    ///
    /// Spawns the event loop that applies pipeline messages, then asks each
    /// pipeline to watch. A pipeline that fails to start watching rejects
    /// every pending request (on all targets) instead of leaving it hanging;
    /// the remaining pipelines still start.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`CompilerError::NotInitialized`] before `initialize`.
    pub fn start_watching(self: &Arc<Self>) -> Result<()> {
        if self.context.get().is_none() {
            return Err(CompilerError::NotInitialized);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run_event_loop(Arc::downgrade(self), rx));
        if let Some(previous) = self.event_loop.lock().replace(handle) {
            previous.abort();
        }

        let options = self.config.watch.clone();
        let mut pipelines = self.pipelines.lock();
        for (target, pipeline) in pipelines.iter_mut() {
            let sink = BuildEventSink::new(target.clone(), tx.clone());
            if let Err(failure) = pipeline.watch(&options, sink) {
                tracing::error!(platform = %target, "failed to start watching: {}", failure);
                self.handle_watch_error(&failure);
            }
        }

        Ok(())
    }

    /// Stop the event loop and drop every pipeline.
    ///
    /// Requests still waiting resolve with [`CompilerError::Cancelled`].
    pub fn shutdown(&self) {
        if let Some(handle) = self.event_loop.lock().take() {
            handle.abort();
        }
        self.pipelines.lock().clear();

        let mut state = self.state.lock();
        for target_state in state.values_mut() {
            target_state.pending.clear();
        }
    }

    /// Apply one pipeline event.
    ///
    /// This is the only place target state changes. Notifications are sent
    /// after the state lock is released.
    pub fn handle_event(&self, target: &Target, event: BuildEvent) {
        tracing::debug!(platform = %target, event = event.kind(), "build event");

        match event {
            BuildEvent::Started => {
                if self.mark_in_progress(target) {
                    self.with_context(|ctx| ctx.notify_build_start(target));
                }
            }
            BuildEvent::Invalidated => {
                if self.mark_in_progress(target) {
                    self.with_context(|ctx| ctx.notify_build_start(target));
                }
                self.with_context(|ctx| {
                    ctx.broadcast_to_hmr_clients(&HmrEvent::Building, target, None)
                });
            }
            BuildEvent::Completed(output) => {
                let Some((body, was_in_progress)) = self.complete_build(target, output) else {
                    return;
                };
                self.with_context(|ctx| {
                    if was_in_progress {
                        ctx.notify_build_end(target);
                    }
                    ctx.broadcast_to_hmr_clients(&HmrEvent::Built(Some(body)), target, None);
                });
            }
            BuildEvent::Failed(failure) => {
                tracing::error!(platform = %target, "build failed: {}", failure);
                let Some(body) = self.fail_build(target, &failure) else {
                    return;
                };
                self.with_context(|ctx| {
                    ctx.broadcast_to_hmr_clients(&HmrEvent::Built(Some(body)), target, None)
                });
            }
        }
    }

    /// Reject the pending requests of every target with `failure`.
    pub fn handle_watch_error(&self, failure: &BuildFailure) {
        tracing::error!("watch failed: {}", failure);
        let mut state = self.state.lock();
        for target in &self.targets {
            if let Some(target_state) = state.get_mut(target) {
                target_state.settle(Err(failure));
            }
        }
    }

    /// Get a build artifact for `target`.
    ///
    /// The cache is checked when this method is called, not when the future
    /// is first polled:
    ///
    /// 1. cached → resolves immediately (even mid-build);
    /// 2. not cached and no build in progress → fails immediately with
    ///    [`CompilerError::ArtifactNotFound`];
    /// 3. otherwise the request waits for the next build of `target` to
    ///    settle, then checks the cache once more.
    ///
    /// There is no timeout; wrap the future in `tokio::time::timeout` if a
    /// deadline is needed.
    pub fn get_artifact(
        &self,
        name: &str,
        target: &Target,
    ) -> impl Future<Output = Result<Asset>> + Send + use<> {
        let lookup = self.lookup(name, target);
        let (name, target) = (name.to_string(), target.clone());

        async move {
            match lookup {
                Lookup::Ready(result) => result,
                Lookup::Waiting(rx) => rx
                    .await
                    .unwrap_or_else(|_| Err(CompilerError::Cancelled { name, target })),
            }
        }
    }

    /// Get the source map of `bundle` (`<bundle>.map`).
    ///
    /// # Errors
    ///
    /// [`CompilerError::SourceMapMissing`] when the map was not produced;
    /// build failures are passed through.
    pub async fn get_source_map(&self, bundle: &str, target: &Target) -> Result<Asset> {
        let map_name = format!("{}.map", bundle);
        match self.get_artifact(&map_name, target).await {
            Err(CompilerError::ArtifactNotFound { .. }) => Err(CompilerError::SourceMapMissing {
                name: bundle.to_string(),
                target: target.clone(),
            }),
            other => other,
        }
    }

    /// Stats of the last completed build, if any.
    pub fn get_stats_snapshot(&self, target: &Target) -> Result<Option<StatsSnapshot>> {
        let state = self.state.lock();
        let target_state = state
            .get(target)
            .ok_or_else(|| CompilerError::UnknownTarget(target.clone()))?;
        Ok(target_state.stats.clone())
    }

    /// Body of a `built`/`sync` HMR event; `None` until a build completes.
    pub fn hmr_body(&self, target: &Target) -> Option<HmrBody> {
        let state = self.state.lock();
        state.get(target)?.stats.as_ref().map(StatsSnapshot::hmr_body)
    }

    /// Name/size of every cached artifact of `target`.
    pub fn list_assets(&self, target: &Target) -> Result<Vec<AssetSummary>> {
        let state = self.state.lock();
        let target_state = state
            .get(target)
            .ok_or_else(|| CompilerError::UnknownTarget(target.clone()))?;
        Ok(target_state.assets.summaries())
    }

    /// Whether `target` is currently building.
    pub fn is_build_in_progress(&self, target: &Target) -> bool {
        self.state
            .lock()
            .get(target)
            .is_some_and(|target_state| target_state.in_progress)
    }

    /// Number of requests waiting on `target`.
    pub fn pending_requests(&self, target: &Target) -> usize {
        self.state
            .lock()
            .get(target)
            .map_or(0, |target_state| target_state.pending.len())
    }

    fn lookup(&self, name: &str, target: &Target) -> Lookup {
        let mut state = self.state.lock();
        let Some(target_state) = state.get_mut(target) else {
            return Lookup::Ready(Err(CompilerError::UnknownTarget(target.clone())));
        };

        if let Some(asset) = target_state.assets.get(name) {
            return Lookup::Ready(Ok(asset.clone()));
        }

        if !target_state.in_progress {
            return Lookup::Ready(Err(CompilerError::ArtifactNotFound {
                name: name.to_string(),
                target: target.clone(),
                in_progress: false,
            }));
        }

        let (tx, rx) = oneshot::channel();
        let (name, target) = (name.to_string(), target.clone());
        target_state.pending.push_back(Box::new(move |outcome| {
            let result = match outcome {
                Ok(assets) => assets
                    .get(&name)
                    .cloned()
                    .ok_or(CompilerError::ArtifactNotFound {
                        name,
                        target,
                        in_progress: true,
                    }),
                Err(failure) => Err(CompilerError::BuildFailed(failure.clone())),
            };
            // Receiver gone means the caller stopped waiting.
            let _ = tx.send(result);
        }));

        Lookup::Waiting(rx)
    }

    /// Set `in_progress`, returning whether it was previously clear.
    fn mark_in_progress(&self, target: &Target) -> bool {
        let mut state = self.state.lock();
        match state.get_mut(target) {
            Some(target_state) => !std::mem::replace(&mut target_state.in_progress, true),
            None => {
                tracing::warn!(platform = %target, "event for unknown target");
                false
            }
        }
    }

    /// Store a finished build and settle its waiters.
    ///
    /// Returns the HMR body and whether the target was marked in progress.
    fn complete_build(&self, target: &Target, output: BuildOutput) -> Option<(HmrBody, bool)> {
        let mut state = self.state.lock();
        let Some(target_state) = state.get_mut(target) else {
            tracing::warn!(platform = %target, "completion for unknown target");
            return None;
        };

        let (snapshot, assets) = output.into_parts();
        let body = snapshot.hmr_body();
        target_state.stats = Some(snapshot);
        target_state.assets.apply_build(assets);
        let was_in_progress = std::mem::replace(&mut target_state.in_progress, false);
        target_state.settle(Ok(()));

        tracing::info!(
            platform = %target,
            assets = target_state.assets.len(),
            time_ms = body.time,
            "build completed"
        );
        Some((body, was_in_progress))
    }

    /// Reject the waiters of `target` and derive the HMR body reporting
    /// `failure`. The stored stats are left as they were.
    fn fail_build(&self, target: &Target, failure: &BuildFailure) -> Option<HmrBody> {
        let mut state = self.state.lock();
        let Some(target_state) = state.get_mut(target) else {
            tracing::warn!(platform = %target, "failure for unknown target");
            return None;
        };
        target_state.settle(Err(failure));

        let mut body = match &target_state.stats {
            Some(stats) => stats.hmr_body(),
            None => HmrBody {
                name: target.to_string(),
                time: 0,
                hash: String::new(),
                warnings: Vec::new(),
                errors: Vec::new(),
            },
        };
        body.errors.push(BuildMessage::new(failure.message()));
        Some(body)
    }

    fn with_context(&self, f: impl FnOnce(&dyn DelegateContext)) {
        if let Some(context) = self.context.get() {
            f(context.as_ref());
        }
    }

    #[cfg(test)]
    fn enqueue_waiter(&self, target: &Target, waiter: Waiter) {
        if let Some(target_state) = self.state.lock().get_mut(target) {
            target_state.pending.push_back(waiter);
        }
    }
}

impl Drop for MultiCompiler {
    fn drop(&mut self) {
        if let Some(handle) = self.event_loop.get_mut().take() {
            handle.abort();
        }
    }
}

async fn run_event_loop(compiler: Weak<MultiCompiler>, mut rx: mpsc::UnboundedReceiver<PipelineMessage>) {
    while let Some(message) = rx.recv().await {
        let Some(compiler) = compiler.upgrade() else {
            break;
        };

        match message {
            PipelineMessage::Build { target, event } => compiler.handle_event(&target, event),
            PipelineMessage::WatchFailed(failure) => compiler.handle_watch_error(&failure),
        }
    }

    tracing::debug!("compiler event loop stopped");
}
