//! Frame-Archiver: a resumable snapshot harvester
//!
//! This crate polls a remote source for time-indexed frames across a fixed
//! window, keeping concurrency bounded, classifying failures, and writing
//! crash-safe checkpoints so an interrupted run can pick up where it left off.

pub mod archiver;
pub mod config;
pub mod output;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for Frame-Archiver operations
#[derive(Debug, Error)]
pub enum ArchiverError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to read auth token from {path}: {source}")]
    AuthToken {
        path: String,
        source: std::io::Error,
    },

    #[error("Run aborted after {error_count} validation errors ({records} records kept)")]
    RunAborted { error_count: u32, records: usize },

    #[error("Run interrupted ({records} records kept)")]
    Interrupted { records: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Classified failure of a single frame fetch
///
/// The class decides how the retry policy treats the failure; the message is
/// only for logs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Network or timeout class failure, expected to clear on its own
    #[error("Transient network error: {0}")]
    Transient(String),

    /// A response arrived but it is malformed or structurally invalid
    #[error("Validation error: {0}")]
    Validation(String),

    /// The shared abort signal was tripped
    #[error("Fetch cancelled")]
    Cancelled,
}

impl FetchError {
    /// Returns true for the network/timeout class
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Returns true if the fetch was cancelled by the abort signal
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Result type alias for Frame-Archiver operations
pub type Result<T> = std::result::Result<T, ArchiverError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for frame fetches
pub type FetchResult<T> = std::result::Result<T, FetchError>;

// Re-export commonly used types
pub use config::Config;
pub use state::{Fragments, Record, RecordSet, RunState, Task};
