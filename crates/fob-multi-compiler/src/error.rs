//! Error types for the build coordinator.
//!
//! Engine failures never escape the coordinator as panics: they are caught
//! at the pipeline boundary and turned into [`CompilerError::BuildFailed`]
//! rejections for whoever is waiting on that target.

use crate::target::Target;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using [`CompilerError`] as the default error type.
pub type Result<T, E = CompilerError> = std::result::Result<T, E>;

/// A fatal failure reported by a build engine.
///
/// Cheap to clone so one failure can be delivered to every pending request
/// of a target.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct BuildFailure {
    message: String,
}

impl BuildFailure {
    /// Create a failure from a human readable message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The failure message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<std::io::Error> for BuildFailure {
    fn from(err: std::io::Error) -> Self {
        Self::new(err.to_string())
    }
}

/// Build configuration problems. Fatal at startup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// No targets were configured
    #[error("No build targets configured\n\nHint: Add at least one entry to 'targets'")]
    NoTargets,

    /// A target has an empty name
    #[error("Build target name cannot be empty")]
    EmptyTargetName,

    /// The same target was configured twice
    #[error("Build target '{0}' is configured more than once")]
    DuplicateTarget(Target),

    /// A target's output directory is unusable
    #[error("Invalid output directory for '{target}': {}\n\nHint: {reason}", .path.display())]
    InvalidOutputDir {
        /// Target the directory belongs to
        target: Target,
        /// Offending path
        path: PathBuf,
        /// What is wrong with it
        reason: String,
    },

    /// The engine refused to construct a pipeline
    #[error("Failed to create build pipeline for '{target}': {reason}")]
    Engine {
        /// Target whose pipeline failed
        target: Target,
        /// Engine-provided reason
        reason: String,
    },
}

/// Errors returned by [`MultiCompiler`](crate::MultiCompiler) operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompilerError {
    /// Bad build configuration
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// The requested artifact was never produced
    #[error("File {name} for {target} not found in compilation assets{}", idle_suffix(.in_progress))]
    ArtifactNotFound {
        /// Requested artifact name
        name: String,
        /// Target it was requested for
        target: Target,
        /// Whether the lookup waited for a build before failing
        in_progress: bool,
    },

    /// The engine reported a fatal failure while the request was waiting
    #[error("Build failed: {0}")]
    BuildFailed(#[from] BuildFailure),

    /// A source map was requested for a bundle that has none
    #[error("Source map for {name} for {target} is missing")]
    SourceMapMissing {
        /// Bundle the map was requested for
        name: String,
        /// Target it was requested for
        target: Target,
    },

    /// The target is not part of this compiler
    #[error("Unknown target '{0}'")]
    UnknownTarget(Target),

    /// `initialize` was called twice
    #[error("Compiler is already initialized")]
    AlreadyInitialized,

    /// An operation needs `initialize` to have run first
    #[error("Compiler not created yet\n\nHint: Call initialize() before start_watching()")]
    NotInitialized,

    /// The compiler was dropped while a request was waiting on it
    #[error("Request for {name} for {target} was cancelled")]
    Cancelled {
        /// Requested artifact name
        name: String,
        /// Target it was requested for
        target: Target,
    },
}

fn idle_suffix(in_progress: &bool) -> &'static str {
    if *in_progress {
        ""
    } else {
        " (no compilation in progress)"
    }
}

impl CompilerError {
    /// Whether this error means "the file does not exist" to an HTTP client.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            CompilerError::ArtifactNotFound { .. }
                | CompilerError::SourceMapMissing { .. }
                | CompilerError::UnknownTarget(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_not_found_mentions_idle_pipeline() {
        let err = CompilerError::ArtifactNotFound {
            name: "index.bundle".to_string(),
            target: Target::from("ios"),
            in_progress: false,
        };
        let msg = err.to_string();
        assert!(msg.contains("index.bundle"));
        assert!(msg.contains("ios"));
        assert!(msg.contains("no compilation in progress"));
    }

    #[test]
    fn test_artifact_not_found_after_build() {
        let err = CompilerError::ArtifactNotFound {
            name: "index.bundle".to_string(),
            target: Target::from("ios"),
            in_progress: true,
        };
        assert!(!err.to_string().contains("no compilation in progress"));
    }

    #[test]
    fn test_configuration_error_converts() {
        let err: CompilerError = ConfigurationError::NoTargets.into();
        assert!(matches!(err, CompilerError::Configuration(_)));
        assert!(err.to_string().contains("Hint:"));
    }

    #[test]
    fn test_not_found_classification() {
        assert!(CompilerError::UnknownTarget(Target::from("web")).is_not_found());
        assert!(CompilerError::SourceMapMissing {
            name: "index.bundle".to_string(),
            target: Target::from("android"),
        }
        .is_not_found());
        assert!(!CompilerError::BuildFailed(BuildFailure::new("boom")).is_not_found());
    }
}
