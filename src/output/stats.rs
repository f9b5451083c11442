//! Statistics generation from an archive artifact
//!
//! This module provides functionality for measuring how much of the
//! configured window an artifact covers and displaying the result.

use crate::config::WindowConfig;
use crate::state::{format_timestamp, Record};
use crate::storage::CheckpointStore;
use crate::ArchiverError;
use std::collections::HashSet;

/// Number of missing timestamps listed individually
const MISSING_SAMPLE: usize = 10;

/// Archive coverage summary
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveStatistics {
    /// Records present in the artifact
    pub total_records: usize,

    /// Timestamps appearing more than once
    pub duplicate_records: usize,

    /// Grid slots inside the configured window
    pub expected_slots: u64,

    /// Grid slots that have a record
    pub covered_slots: u64,

    /// Number of grid slots with no record
    pub missing_count: u64,

    /// The first few missing timestamps, ascending
    pub missing_sample: Vec<i64>,

    /// Records outside the window or off the step grid
    pub off_grid_records: usize,

    /// Earliest and latest record timestamps
    pub first_timestamp: Option<i64>,
    pub last_timestamp: Option<i64>,

    /// Populated count per fragment index
    pub fragments_populated: Vec<usize>,

    /// Whether the artifact is strictly ascending by timestamp
    pub sorted: bool,
}

impl ArchiveStatistics {
    /// Computes statistics for `records` against `window`
    pub fn compute(records: &[Record], window: &WindowConfig, fragment_count: usize) -> Self {
        let start = window.start_ms();
        let end = window.end_ms();
        let step = window.step_ms.max(1);

        let mut seen = HashSet::with_capacity(records.len());
        let mut duplicate_records = 0;
        let mut off_grid_records = 0;
        let mut fragments_populated = vec![0; fragment_count];

        for record in records {
            if !seen.insert(record.timestamp) {
                duplicate_records += 1;
                continue;
            }
            let on_grid = record.timestamp >= start
                && record.timestamp < end
                && (record.timestamp - start) % step == 0;
            if !on_grid {
                off_grid_records += 1;
            }
            for (index, fragment) in record.fragments.iter().enumerate() {
                if fragment.is_some() {
                    if let Some(count) = fragments_populated.get_mut(index) {
                        *count += 1;
                    }
                }
            }
        }

        let mut covered_slots = 0;
        let mut missing_count = 0;
        let mut missing_sample = Vec::new();
        let mut t = start;
        while t < end {
            if seen.contains(&t) {
                covered_slots += 1;
            } else {
                missing_count += 1;
                if missing_sample.len() < MISSING_SAMPLE {
                    missing_sample.push(t);
                }
            }
            t = match t.checked_add(step) {
                Some(next) => next,
                None => break,
            };
        }

        let sorted = records.windows(2).all(|w| w[0].timestamp < w[1].timestamp);

        Self {
            total_records: records.len(),
            duplicate_records,
            expected_slots: window.slot_count(),
            covered_slots,
            missing_count,
            missing_sample,
            off_grid_records,
            first_timestamp: records.iter().map(|r| r.timestamp).min(),
            last_timestamp: records.iter().map(|r| r.timestamp).max(),
            fragments_populated,
            sorted,
        }
    }

    /// Percentage of window slots covered
    pub fn coverage(&self) -> f64 {
        if self.expected_slots == 0 {
            return 0.0;
        }
        (self.covered_slots as f64 / self.expected_slots as f64) * 100.0
    }
}

/// Loads an artifact through `store` and computes its statistics
///
/// # Returns
///
/// * `Ok(Some(stats))` - The artifact exists
/// * `Ok(None)` - Nothing has been saved yet
/// * `Err(ArchiverError)` - The artifact could not be read
pub fn load_statistics(
    store: &dyn CheckpointStore,
    window: &WindowConfig,
    fragment_count: usize,
) -> Result<Option<ArchiveStatistics>, ArchiverError> {
    let records = match store.load()? {
        Some(records) => records,
        None => return Ok(None),
    };
    Ok(Some(ArchiveStatistics::compute(
        &records,
        window,
        fragment_count,
    )))
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &ArchiveStatistics) {
    println!("=== Archive Statistics ===\n");

    println!("Overview:");
    println!("  Records: {}", stats.total_records);
    if let (Some(first), Some(last)) = (stats.first_timestamp, stats.last_timestamp) {
        println!("  First frame: {}", format_timestamp(first));
        println!("  Last frame: {}", format_timestamp(last));
    }
    println!(
        "  Order: {}",
        if stats.sorted { "ascending" } else { "unsorted (intermediate checkpoint)" }
    );
    println!();

    println!("Coverage:");
    println!(
        "  {} / {} slots ({:.1}%)",
        stats.covered_slots,
        stats.expected_slots,
        stats.coverage()
    );
    println!("  Missing: {}", stats.missing_count);
    for t in &stats.missing_sample {
        println!("    - {}", format_timestamp(*t));
    }
    if stats.missing_count > stats.missing_sample.len() as u64 {
        println!(
            "    ... and {} more",
            stats.missing_count - stats.missing_sample.len() as u64
        );
    }
    if stats.off_grid_records > 0 {
        println!("  Off-grid records: {}", stats.off_grid_records);
    }
    if stats.duplicate_records > 0 {
        println!("  Duplicate records: {}", stats.duplicate_records);
    }
    println!();

    println!("Fragments populated:");
    for (index, count) in stats.fragments_populated.iter().enumerate() {
        println!("  [{}]: {}", index, count);
    }
}
