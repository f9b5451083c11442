//! Task definition for scheduled frame fetches
//!
//! A task is an immutable value: retrying produces a new task rather than
//! mutating the one held by the queue.
use chrono::{DateTime, Utc};
use std::fmt;

/// A unit of scheduled work identified by the timestamp to fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Task {
    /// Frame timestamp in epoch milliseconds
    pub timestamp: i64,

    /// Number of validation failures this task has accumulated
    pub retry_count: u32,
}

impl Task {
    /// Creates a fresh task with no retries
    pub fn new(timestamp: i64) -> Self {
        Self {
            timestamp,
            retry_count: 0,
        }
    }

    /// Returns a copy of this task with the retry count incremented
    pub fn with_retry(self) -> Self {
        Self {
            retry_count: self.retry_count.saturating_add(1),
            ..self
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", format_timestamp(self.timestamp))
    }
}

/// Renders epoch milliseconds as an RFC 3339 string, falling back to the raw number
pub fn format_timestamp(timestamp: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(timestamp)
        .map(|dt| dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
        .unwrap_or_else(|| timestamp.to_string())
}
