//! JSON checkpoint backend
//!
//! The artifact is an array with one compact record per line:
//!
//! ```text
//! [
//! 	{"timestamp":1689858000000,"fragments":["https://…",null,null,null,null,null]},
//! 	{"timestamp":1689858015000,"fragments":[…]}
//! ]
//! ```

use crate::state::Record;
use crate::storage::traits::{CheckpointStore, StorageError, StorageResult};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Checkpoint store backed by a single JSON file
#[derive(Debug, Clone)]
pub struct JsonCheckpointStore {
    path: PathBuf,
    fragment_count: usize,
}

impl JsonCheckpointStore {
    /// Creates a store for the artifact at `path`
    ///
    /// `fragment_count` is checked against every loaded record.
    pub fn new(path: &Path, fragment_count: usize) -> Self {
        Self {
            path: path.to_path_buf(),
            fragment_count,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parent_dir(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }
}

impl CheckpointStore for JsonCheckpointStore {
    fn load(&self) -> StorageResult<Option<Vec<Record>>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!("No checkpoint at {}", self.path.display());
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let records: Vec<Record> = serde_json::from_str(&content)?;

        if let Some(bad) = records
            .iter()
            .find(|r| r.fragments.len() != self.fragment_count)
        {
            return Err(StorageError::Corrupt(format!(
                "record {} has {} fragments, expected {}",
                bad.timestamp,
                bad.fragments.len(),
                self.fragment_count
            )));
        }

        tracing::info!(
            "Loaded {} existing records from {}",
            records.len(),
            self.path.display()
        );
        Ok(Some(records))
    }

    fn save(&self, records: &[Record]) -> StorageResult<()> {
        let rendered = render_records(records)?;

        let mut temp = NamedTempFile::new_in(self.parent_dir())?;
        temp.write_all(rendered.as_bytes())?;
        temp.as_file().sync_all()?;
        temp.persist(&self.path)?;
        sync_dir(self.parent_dir())?;

        tracing::info!("Saved {} records.", records.len());
        Ok(())
    }
}

/// Flushes the directory entry so the rename itself survives a power loss
#[cfg(unix)]
fn sync_dir(dir: &Path) -> std::io::Result<()> {
    std::fs::File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Renders records in the artifact layout
///
/// Output depends only on the input slice, so equal inputs give byte-identical files.
pub fn render_records(records: &[Record]) -> StorageResult<String> {
    let mut out = String::from("[");
    for (i, record) in records.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str("\n\t");
        out.push_str(&serde_json::to_string(record)?);
    }
    out.push_str("\n]\n");
    Ok(out)
}
