//! Ingestion gate: timestamps incoming drafts and writes them to the store.

use crate::error::Result;
use crate::store::Store;
use crate::types::{LogRecord, RecordDraft, RecordInput, Timestamp};
use std::sync::Arc;

/// Accepts record drafts, assigns timestamps, and appends to the store.
///
/// Fields are optional by design; a draft is never rejected for missing
/// optional fields. The only failure mode is the store's own I/O error,
/// surfaced synchronously to the caller.
pub struct IngestionGate {
    store: Arc<Store>,
}

impl IngestionGate {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Persist a draft, defaulting `sent_at` to now when absent.
    ///
    /// Returns the stored record including its assigned id.
    pub fn ingest(&self, draft: RecordDraft) -> Result<LogRecord> {
        let input = RecordInput::from_draft(draft, Timestamp::now());
        self.store.append(input)
    }
}
