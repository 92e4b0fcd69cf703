//! Error types for the development server.
//!
//! Mirrors the layering of the build coordinator: domain errors
//! ([`ConfigError`], [`RoutingError`]) convert into the top-level
//! [`DevServerError`], which the binary turns into a `miette` report.

use fob_multi_compiler::CompilerError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using [`DevServerError`] as the default error type.
pub type Result<T, E = DevServerError> = std::result::Result<T, E>;

/// Top-level development server error.
#[derive(Debug, Error)]
pub enum DevServerError {
    /// Configuration could not be loaded or is inconsistent
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// WebSocket routes could not be registered
    #[error("Routing error: {0}")]
    Routing(#[from] RoutingError),

    /// The build coordinator refused an operation
    #[error("Compiler error: {0}")]
    Compiler(#[from] CompilerError),

    /// I/O errors (binding the listener, reading files)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The HTTP server failed while running
    #[error("Server error: {0}")]
    Server(String),
}

/// Configuration-specific errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file passed with `--config` does not exist
    #[error("Config file not found: {}\n\nHint: Create a fob.dev.json file or omit --config", .0.display())]
    NotFound(PathBuf),

    /// Sources could not be merged or deserialized
    #[error("Failed to load configuration: {0}\n\nHint: Check fob.dev.json syntax and field types")]
    Load(String),

    /// Missing required configuration field
    #[error("Missing required field: {field}\n\nHint: {hint}")]
    MissingField {
        /// Name of the missing field
        field: String,
        /// Helpful hint for providing the field
        hint: String,
    },

    /// Invalid value for a configuration option
    #[error("Invalid value for '{field}': {value}\n\nHint: {hint}")]
    InvalidValue {
        /// Name of the field with invalid value
        field: String,
        /// The invalid value
        value: String,
        /// Helpful hint for correct values
        hint: String,
    },
}

/// WebSocket route registration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    /// Two servers claim the same path
    #[error("WebSocket path '{path}' is already handled by '{existing}'")]
    DuplicatePath {
        /// Contested path
        path: String,
        /// Name of the server registered first
        existing: String,
    },

    /// A server was registered after the router started serving
    #[error("Cannot register '{0}': the WebSocket router is frozen")]
    Frozen(String),
}

/// Convert a [`DevServerError`] into a `miette` report for the terminal.
pub fn to_miette(err: DevServerError) -> miette::Report {
    match err {
        DevServerError::Config(e) => miette::miette!("Configuration error: {}", e),
        DevServerError::Compiler(CompilerError::Configuration(e)) => {
            miette::miette!("Build configuration error: {}", e)
        }
        _ => miette::miette!("{}", err),
    }
}
