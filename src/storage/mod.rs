//! Storage module for persisting archive checkpoints
//!
//! This module handles all checkpoint I/O for the archiver, including:
//! - Rendering the record set in a stable, diffable JSON layout
//! - Atomic write-then-rename replacement of the artifact
//! - Loading a previous artifact to resume a run

mod json;
mod traits;

pub use json::{render_records, JsonCheckpointStore};
pub use traits::{CheckpointStore, StorageError, StorageResult};

use std::path::Path;

/// Opens the JSON checkpoint store at `path`
///
/// Nothing is read or created until `load` or `save` is called.
pub fn open_checkpoint(path: &Path, fragment_count: usize) -> JsonCheckpointStore {
    JsonCheckpointStore::new(path, fragment_count)
}
