//! Output module for reporting on archive artifacts
//!
//! This module handles:
//! - Computing coverage statistics for an existing artifact
//! - Printing them for the `--stats` mode

pub mod stats;

pub use stats::{load_statistics, print_statistics, ArchiveStatistics};
