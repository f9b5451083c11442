//! Storage traits and error types
//!
//! This module defines the trait interface for checkpoint backends and
//! associated error types.

use crate::state::Record;
use thiserror::Error;

/// Errors that can occur during checkpoint operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt checkpoint: {0}")]
    Corrupt(String),

    #[error("Failed to replace checkpoint: {0}")]
    Persist(#[from] tempfile::PersistError),

    #[error("Checkpoint writer failed: {0}")]
    Writer(#[from] tokio::task::JoinError),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for checkpoint backend implementations
///
/// A checkpoint is always the full record set, never a diff. The coordinator
/// relies only on this trait to decide whether a run is resumable; it never
/// looks at the filesystem itself.
pub trait CheckpointStore {
    /// Loads a previously saved record set
    ///
    /// # Returns
    ///
    /// * `Ok(Some(records))` - A prior checkpoint exists
    /// * `Ok(None)` - Nothing saved yet, this is a fresh run
    /// * `Err(StorageError)` - A checkpoint exists but cannot be read
    fn load(&self) -> StorageResult<Option<Vec<Record>>>;

    /// Replaces the checkpoint with `records`
    ///
    /// Implementations must be atomic from the caller's point of view: after
    /// a crash, `load` sees either the previous content or the new one.
    fn save(&self, records: &[Record]) -> StorageResult<()>;
}
