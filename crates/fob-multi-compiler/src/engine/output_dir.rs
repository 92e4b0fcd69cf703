//! Engine that serves whatever an external bundler writes to disk.
//!
//! Each target's pipeline watches its output directory. A change marks the
//! build invalidated; once the directory has been quiet for the aggregate
//! timeout it is rescanned and every file whose modification time changed is
//! reported as a completed build.

use super::{BuildEngine, TargetPipeline};
use crate::asset::{Asset, AssetInfo};
use crate::config::{TargetConfig, WatchOptions};
use crate::error::{BuildFailure, ConfigurationError};
use crate::event::{BuildEvent, BuildEventSink, BuildOutput};
use crate::target::Target;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use walkdir::WalkDir;

/// Marker in file names of hot-update chunks.
const HOT_UPDATE_MARKER: &str = ".hot-update.";

/// Builds every target by watching a per-target output directory.
#[derive(Debug, Clone)]
pub struct OutputDirEngine {
    root: PathBuf,
}

impl OutputDirEngine {
    /// Create an engine resolving relative output directories against `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, output_dir: &Path) -> PathBuf {
        if output_dir.is_absolute() {
            output_dir.to_path_buf()
        } else {
            self.root.join(output_dir)
        }
    }
}

impl BuildEngine for OutputDirEngine {
    fn create_pipeline(
        &self,
        config: &TargetConfig,
    ) -> Result<Box<dyn TargetPipeline>, ConfigurationError> {
        let dir = self.resolve(&config.output_dir);
        let invalid = |reason: String| ConfigurationError::InvalidOutputDir {
            target: config.name.clone(),
            path: dir.clone(),
            reason,
        };

        if dir.exists() {
            if !dir.is_dir() {
                return Err(invalid(
                    "The path exists but is not a directory".to_string(),
                ));
            }
        } else {
            std::fs::create_dir_all(&dir)
                .map_err(|e| invalid(format!("Could not create it: {}", e)))?;
            tracing::debug!(platform = %config.name, dir = %dir.display(), "created output directory");
        }

        Ok(Box::new(OutputDirPipeline {
            target: config.name.clone(),
            dir,
            watcher: None,
            task: None,
        }))
    }
}

/// What the notify callback tells the pipeline task.
#[derive(Debug)]
enum Signal {
    Changed,
    Error(String),
}

struct OutputDirPipeline {
    target: Target,
    dir: PathBuf,
    watcher: Option<RecommendedWatcher>,
    task: Option<JoinHandle<()>>,
}

impl TargetPipeline for OutputDirPipeline {
    fn watch(&mut self, options: &WatchOptions, sink: BuildEventSink) -> Result<(), BuildFailure> {
        if self.watcher.is_some() {
            return Err(BuildFailure::new(format!(
                "Output directory for {} is already being watched",
                self.target
            )));
        }

        // Capacity 1: a queued signal already means "rescan".
        let (tx, rx) = mpsc::channel(1);
        let ignored = options.ignored.clone();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let signal = match res {
                Ok(event) if is_relevant(&event, &ignored) => Signal::Changed,
                Ok(_) => return,
                Err(e) => Signal::Error(e.to_string()),
            };
            let _ = tx.try_send(signal);
        })
        .map_err(|e| BuildFailure::new(format!("Failed to create watcher: {}", e)))?;

        watcher
            .watch(&self.dir, RecursiveMode::Recursive)
            .map_err(|e| {
                BuildFailure::new(format!(
                    "Failed to watch {}: {}",
                    self.dir.display(),
                    e
                ))
            })?;

        let scanner = Scanner::new(self.target.clone(), self.dir.clone(), options.ignored.clone());
        self.task = Some(tokio::spawn(run_pipeline(
            scanner,
            options.clone(),
            sink,
            rx,
        )));
        self.watcher = Some(watcher);

        tracing::info!(platform = %self.target, dir = %self.dir.display(), "watching output directory");
        Ok(())
    }
}

impl Drop for OutputDirPipeline {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

fn is_relevant(event: &Event, ignored: &[String]) -> bool {
    if matches!(event.kind, EventKind::Access(_)) {
        return false;
    }

    event
        .paths
        .iter()
        .any(|path| !is_ignored(&path.to_string_lossy(), ignored))
}

fn is_ignored(name: &str, ignored: &[String]) -> bool {
    ignored.iter().any(|pattern| name.contains(pattern.as_str()))
}

async fn run_pipeline(
    scanner: Scanner,
    options: WatchOptions,
    sink: BuildEventSink,
    mut rx: mpsc::Receiver<Signal>,
) {
    let aggregate = options.aggregate_timeout();

    if !sink.emit(BuildEvent::Started) {
        return;
    }
    let Some(mut scanner) = rebuild(scanner, &sink).await else {
        return;
    };

    while let Some(signal) = rx.recv().await {
        if let Signal::Error(message) = signal {
            tracing::warn!(platform = %sink.target(), "watcher error: {}", message);
            if !sink.watch_failed(BuildFailure::new(message)) {
                return;
            }
            continue;
        }

        if !sink.emit(BuildEvent::Invalidated) {
            return;
        }

        // Wait until the directory has been quiet for the whole window.
        loop {
            match tokio::time::timeout(aggregate, rx.recv()).await {
                Ok(Some(_)) => continue,
                Ok(None) => return,
                Err(_) => break,
            }
        }

        scanner = match rebuild(scanner, &sink).await {
            Some(scanner) => scanner,
            None => return,
        };
    }
}

/// Rescan off the runtime and report the outcome. `None` means the scanner
/// was lost or the coordinator is gone.
async fn rebuild(mut scanner: Scanner, sink: &BuildEventSink) -> Option<Scanner> {
    let joined = tokio::task::spawn_blocking(move || {
        let result = scanner.scan();
        (scanner, result)
    })
    .await;

    match joined {
        Ok((scanner, result)) => {
            let event = match result {
                Ok(output) => BuildEvent::Completed(output),
                Err(failure) => BuildEvent::Failed(failure),
            };
            sink.emit(event).then_some(scanner)
        }
        Err(e) => {
            sink.emit(BuildEvent::Failed(BuildFailure::new(format!(
                "Output scan aborted: {}",
                e
            ))));
            None
        }
    }
}

/// Tracks modification times between scans of one output directory.
struct Scanner {
    target: Target,
    dir: PathBuf,
    ignored: Vec<String>,
    mtimes: HashMap<String, SystemTime>,
}

impl Scanner {
    fn new(target: Target, dir: PathBuf, ignored: Vec<String>) -> Self {
        Self {
            target,
            dir,
            ignored,
            mtimes: HashMap::new(),
        }
    }

    /// Collect every file changed since the previous scan.
    fn scan(&mut self) -> Result<BuildOutput, BuildFailure> {
        let started = Instant::now();
        let mut hasher = blake3::Hasher::new();
        let mut seen = HashMap::new();
        let mut output = BuildOutput::new(self.target.as_str());

        for entry in WalkDir::new(&self.dir).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                BuildFailure::new(format!("Failed to scan {}: {}", self.dir.display(), e))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }

            let Some(name) = relative_name(&self.dir, entry.path()) else {
                continue;
            };
            if is_ignored(&name, &self.ignored) {
                continue;
            }

            let modified = entry
                .metadata()
                .map_err(|e| BuildFailure::new(format!("Failed to stat {}: {}", name, e)))?
                .modified()?;
            let unchanged = self.mtimes.get(&name) == Some(&modified);
            seen.insert(name.clone(), modified);
            if unchanged {
                continue;
            }

            let data = std::fs::read(entry.path())
                .map_err(|e| BuildFailure::new(format!("Failed to read {}: {}", name, e)))?;
            hasher.update(name.as_bytes());
            hasher.update(&data);

            let map_name = format!("{}.map", name);
            let info = AssetInfo {
                hot_module_replacement: name.contains(HOT_UPDATE_MARKER),
                related_source_map: self.dir.join(&map_name).is_file().then_some(map_name),
            };
            output.assets.push((name, Asset::with_info(data, info)));
        }

        self.mtimes = seen;
        output.hash = hasher.finalize().to_hex().to_string();
        output.time = started.elapsed().as_millis() as u64;

        tracing::debug!(
            platform = %self.target,
            changed = output.assets.len(),
            "scanned output directory"
        );
        Ok(output)
    }
}

fn relative_name(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<_> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect();
    Some(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::PipelineMessage;
    use std::fs::{self, File};
    use std::time::Duration;
    use tempfile::TempDir;

    fn bump_mtime(path: &Path) {
        let file = File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(60))
            .unwrap();
    }

    #[test]
    fn test_create_pipeline_creates_missing_dir() {
        let temp = TempDir::new().unwrap();
        let engine = OutputDirEngine::new(temp.path());

        engine
            .create_pipeline(&TargetConfig::new("android", "build/android"))
            .unwrap();
        assert!(temp.path().join("build/android").is_dir());
    }

    #[test]
    fn test_create_pipeline_rejects_file() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("out"), "not a dir").unwrap();
        let engine = OutputDirEngine::new(temp.path());

        let err = engine
            .create_pipeline(&TargetConfig::new("ios", "out"))
            .err()
            .unwrap();
        assert!(matches!(err, ConfigurationError::InvalidOutputDir { .. }));
        assert!(err.to_string().contains("not a directory"));
    }

    #[test]
    fn test_scan_reports_only_changed_files() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("assets")).unwrap();
        fs::write(temp.path().join("index.bundle"), "v1").unwrap();
        fs::write(temp.path().join("index.bundle.map"), "{}").unwrap();
        fs::write(temp.path().join("assets/logo.png"), [0u8; 4]).unwrap();

        let mut scanner = Scanner::new(Target::from("ios"), temp.path().to_path_buf(), vec![]);
        let first = scanner.scan().unwrap();
        let names: Vec<_> = first.assets.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["assets/logo.png", "index.bundle", "index.bundle.map"]);
        assert_eq!(
            first.assets[1].1.info.related_source_map.as_deref(),
            Some("index.bundle.map")
        );
        assert_eq!(first.name, "ios");

        fs::write(temp.path().join("index.bundle"), "v2").unwrap();
        bump_mtime(&temp.path().join("index.bundle"));
        let second = scanner.scan().unwrap();
        assert_eq!(second.assets.len(), 1);
        assert_eq!(second.assets[0].0, "index.bundle");
        assert_eq!(second.assets[0].1.data, b"v2");
        assert_ne!(first.hash, second.hash);
    }

    #[test]
    fn test_scan_flags_hot_updates_and_skips_ignored() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("main.abc.hot-update.js"), "hmr").unwrap();
        fs::write(temp.path().join("index.bundle.tmp"), "partial").unwrap();

        let mut scanner = Scanner::new(
            Target::from("android"),
            temp.path().to_path_buf(),
            vec![".tmp".to_string()],
        );
        let output = scanner.scan().unwrap();
        assert_eq!(output.assets.len(), 1);
        assert!(output.assets[0].1.is_hot_update());
    }

    async fn recv(rx: &mut mpsc::UnboundedReceiver<PipelineMessage>) -> PipelineMessage {
        tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_watch_emits_started_then_completed() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("index.bundle"), "v1").unwrap();

        let engine = OutputDirEngine::new(temp.path());
        let mut pipeline = engine
            .create_pipeline(&TargetConfig::new("android", "."))
            .unwrap();
        let (sink, mut rx) = BuildEventSink::detached(Target::from("android"));
        pipeline.watch(&WatchOptions::default(), sink.clone()).unwrap();

        let PipelineMessage::Build { event, .. } = recv(&mut rx).await else {
            panic!("expected a build event");
        };
        assert_eq!(event, BuildEvent::Started);

        let PipelineMessage::Build { event, .. } = recv(&mut rx).await else {
            panic!("expected a build event");
        };
        let BuildEvent::Completed(output) = event else {
            panic!("expected completion, got {:?}", event);
        };
        assert_eq!(output.assets.len(), 1);

        assert!(pipeline.watch(&WatchOptions::default(), sink).is_err());
    }
}
