//! In-memory record indexes for time-ordered and per-customer lookups.
//!
//! Rebuilt by scanning the log on open; the log rewrite performed by bulk
//! deletes would invalidate any persisted offsets.

use crate::types::{CustomerFilter, Level, LevelFilter, LogRecord, RecordId, Timestamp};
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// Per-record index entry: enough to filter without touching the log file.
#[derive(Clone, Debug)]
struct IndexEntry {
    offset: u64,
    level: Level,
    customer_id: Option<String>,
}

/// Time and customer indexes over the record log.
///
/// The time index keys on `(sent_at, id)`, so a range scan yields exactly
/// the ordering the query contract requires.
pub struct RecordIndex {
    /// (sent_at, id) -> entry, in delivery order.
    by_time: RwLock<BTreeMap<(Timestamp, RecordId), IndexEntry>>,

    /// customer id -> number of records.
    customer_counts: RwLock<BTreeMap<String, u64>>,
}

impl RecordIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self {
            by_time: RwLock::new(BTreeMap::new()),
            customer_counts: RwLock::new(BTreeMap::new()),
        }
    }

    /// Add an entry for a record at `offset`.
    pub fn add(&self, record: &LogRecord, offset: u64) {
        self.by_time.write().insert(
            (record.sent_at, record.id),
            IndexEntry {
                offset,
                level: record.level,
                customer_id: record.customer_id.clone(),
            },
        );

        if let Some(customer) = &record.customer_id {
            *self
                .customer_counts
                .write()
                .entry(customer.clone())
                .or_insert(0) += 1;
        }
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.by_time.write().clear();
        self.customer_counts.write().clear();
    }

    /// Offsets of all records with `sent_at >= from` passing both filters,
    /// in ascending `(sent_at, id)` order.
    pub fn collect_range(
        &self,
        from: Timestamp,
        levels: LevelFilter,
        customer: &CustomerFilter,
    ) -> Vec<u64> {
        self.by_time
            .read()
            .range((from, RecordId(0))..)
            .filter(|(_, entry)| {
                levels.passes(entry.level) && customer.matches(entry.customer_id.as_deref())
            })
            .map(|(_, entry)| entry.offset)
            .collect()
    }

    /// Number of records passing the customer filter.
    pub fn count(&self, customer: &CustomerFilter) -> u64 {
        match customer {
            CustomerFilter::All => self.by_time.read().len() as u64,
            CustomerFilter::Exact(id) => {
                self.customer_counts.read().get(id).copied().unwrap_or(0)
            }
        }
    }

    /// All customer ids present, sorted.
    pub fn distinct_customers(&self) -> Vec<String> {
        self.customer_counts.read().keys().cloned().collect()
    }

    /// Total number of indexed records.
    pub fn len(&self) -> usize {
        self.by_time.read().len()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.by_time.read().is_empty()
    }
}

impl Default for RecordIndex {
    fn default() -> Self {
        Self::new()
    }
}
