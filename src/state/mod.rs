//! State module for tracking archive progress
//!
//! This module provides the value types that flow through a run.
//!
//! # Components
//!
//! - `Task`: A timestamp scheduled for fetching, with its retry count
//! - `Record` / `Fragments`: A successfully fetched frame and its fixed-position parts
//! - `RecordSet`: The deduplicated, append-only collection of fetched records
//! - `RunState`: Process-wide counters and the shared abort signal

mod record;
mod run_state;
mod task;

// Re-export main types
pub use record::{Fragments, Record, RecordSet, DEFAULT_FRAGMENT_COUNT};
pub use run_state::RunState;
pub use task::{format_timestamp, Task};
