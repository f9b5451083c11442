//! Record types for fetched frames
//!
//! A `Record` is the immutable result of one successful fetch. Its fragments
//! form a fixed-length sequence addressed by a small index; the index is
//! checked before every write.

use crate::FetchError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Fragment count used when the configuration does not override it
pub const DEFAULT_FRAGMENT_COUNT: usize = 6;

/// Fixed-length sequence of optional fragment URLs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fragments(Vec<Option<String>>);

impl Fragments {
    /// Creates `count` empty slots
    pub fn with_count(count: usize) -> Self {
        Self(vec![None; count])
    }

    /// Writes `url` into slot `index`
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Validation` if the index lies outside
    /// `[0, len)` or the slot has already been written.
    pub fn set(&mut self, index: i64, url: String) -> Result<(), FetchError> {
        let len = self.0.len();
        let slot = usize::try_from(index)
            .ok()
            .and_then(|i| self.0.get_mut(i))
            .ok_or_else(|| {
                FetchError::Validation(format!(
                    "Invalid fragment index {} (expected 0..{})",
                    index, len
                ))
            })?;

        if slot.is_some() {
            return Err(FetchError::Validation(format!(
                "Duplicate fragment index {}",
                index
            )));
        }

        *slot = Some(url);
        Ok(())
    }

    /// Returns the fragment at `index`, if present
    pub fn get(&self, index: usize) -> Option<&str> {
        self.0.get(index).and_then(|f| f.as_deref())
    }

    /// Number of slots (populated or not)
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of populated slots
    pub fn populated(&self) -> usize {
        self.0.iter().filter(|f| f.is_some()).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = Option<&str>> {
        self.0.iter().map(|f| f.as_deref())
    }
}

impl From<Vec<Option<String>>> for Fragments {
    fn from(slots: Vec<Option<String>>) -> Self {
        Self(slots)
    }
}

/// The fetched result for one timestamp
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Frame timestamp in epoch milliseconds
    pub timestamp: i64,

    /// Fragment URLs, one slot per fragment index
    pub fragments: Fragments,
}

impl Record {
    pub fn new(timestamp: i64, fragments: Fragments) -> Self {
        Self {
            timestamp,
            fragments,
        }
    }
}

/// All records fetched for a run
///
/// Records are kept in insertion order until `sort` is called; a timestamp
/// index rejects duplicates so the set never holds the same frame twice.
#[derive(Debug, Clone, Default)]
pub struct RecordSet {
    records: Vec<Record>,
    timestamps: HashSet<i64>,
}

impl RecordSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a set from previously persisted records, dropping duplicates
    ///
    /// The first occurrence of a timestamp wins.
    pub fn from_records(records: Vec<Record>) -> Self {
        let mut set = Self::new();
        for record in records {
            if !set.insert(record) {
                tracing::warn!("Dropping duplicate record in loaded checkpoint");
            }
        }
        set
    }

    /// Appends a record
    ///
    /// Returns `false` (and leaves the set unchanged) if a record with the
    /// same timestamp is already present.
    pub fn insert(&mut self, record: Record) -> bool {
        if !self.timestamps.insert(record.timestamp) {
            return false;
        }
        self.records.push(record);
        true
    }

    pub fn contains(&self, timestamp: i64) -> bool {
        self.timestamps.contains(&timestamp)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Sorts records ascending by timestamp
    pub fn sort(&mut self) {
        self.records.sort_by_key(|r| r.timestamp);
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(timestamp: i64) -> Record {
        Record::new(timestamp, Fragments::with_count(DEFAULT_FRAGMENT_COUNT))
    }

    #[test]
    fn test_fragments_start_empty() {
        let fragments = Fragments::with_count(6);
        assert_eq!(fragments.len(), 6);
        assert_eq!(fragments.populated(), 0);
        assert!(fragments.iter().all(|f| f.is_none()));
    }

    #[test]
    fn test_fragment_set_in_range() {
        let mut fragments = Fragments::with_count(6);
        fragments.set(0, "https://a/0.png".to_string()).unwrap();
        fragments.set(5, "https://a/5.png".to_string()).unwrap();

        assert_eq!(fragments.get(0), Some("https://a/0.png"));
        assert_eq!(fragments.get(5), Some("https://a/5.png"));
        assert_eq!(fragments.get(3), None);
        assert_eq!(fragments.populated(), 2);
    }

    #[test]
    fn test_fragment_index_out_of_range_is_validation_error() {
        let mut fragments = Fragments::with_count(6);

        let too_high = fragments.set(6, "https://a/6.png".to_string());
        let negative = fragments.set(-1, "https://a/x.png".to_string());

        assert!(matches!(too_high, Err(FetchError::Validation(_))));
        assert!(matches!(negative, Err(FetchError::Validation(_))));
        assert_eq!(fragments.populated(), 0);
        assert_eq!(fragments.len(), 6);
    }

    #[test]
    fn test_fragment_written_twice_is_rejected() {
        let mut fragments = Fragments::with_count(2);
        fragments.set(1, "first".to_string()).unwrap();

        let result = fragments.set(1, "second".to_string());
        assert!(matches!(result, Err(FetchError::Validation(_))));
        assert_eq!(fragments.get(1), Some("first"));
    }

    #[test]
    fn test_record_json_shape() {
        let mut fragments = Fragments::with_count(3);
        fragments.set(1, "https://x/1.png".to_string()).unwrap();
        let json = serde_json::to_string(&Record::new(42, fragments)).unwrap();

        assert_eq!(
            json,
            r#"{"timestamp":42,"fragments":[null,"https://x/1.png",null]}"#
        );
    }

    #[test]
    fn test_record_set_rejects_duplicates() {
        let mut set = RecordSet::new();
        assert!(set.insert(record(15_000)));
        assert!(!set.insert(record(15_000)));
        assert_eq!(set.len(), 1);
        assert!(set.contains(15_000));
    }

    #[test]
    fn test_record_set_sort() {
        let mut set = RecordSet::new();
        for ts in [45_000, 0, 30_000, 15_000] {
            set.insert(record(ts));
        }
        set.sort();

        let order: Vec<i64> = set.records().iter().map(|r| r.timestamp).collect();
        assert_eq!(order, vec![0, 15_000, 30_000, 45_000]);
    }

    #[test]
    fn test_from_records_dedups() {
        let set = RecordSet::from_records(vec![record(0), record(30_000), record(0)]);
        assert_eq!(set.len(), 2);
        assert!(set.contains(0));
        assert!(set.contains(30_000));
    }
}
