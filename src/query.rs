//! Read-only query facade over the store.

use crate::error::Result;
use crate::store::Store;
use crate::types::{CustomerFilter, LevelFilter, LogRecord, Timestamp};
use std::sync::Arc;

/// Bounded historical queries. No caching: every call reflects the store
/// state at call time.
pub struct QueryService {
    store: Arc<Store>,
}

impl QueryService {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Records with `sent_at >= from` passing both filters, in ascending
    /// `(sent_at, id)` order.
    pub fn query_range(
        &self,
        from: Timestamp,
        levels: LevelFilter,
        customer: &CustomerFilter,
    ) -> Result<Vec<LogRecord>> {
        self.store.query_range(from, levels, customer)
    }

    /// Number of records passing the customer filter.
    pub fn count(&self, customer: &CustomerFilter) -> u64 {
        self.store.count(customer)
    }

    /// All customer ids present, sorted.
    pub fn distinct_customers(&self) -> Vec<String> {
        self.store.distinct_customers()
    }
}
