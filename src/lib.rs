//! # Log Relay
//!
//! A durable log distribution and retention engine: structured records from
//! distributed clients are ingested into an append-only store, served back
//! through bounded historical queries, streamed to subscribed consumers as
//! they arrive, and evicted once they age past a retention horizon.
//!
//! ## Core Concepts
//!
//! - **Store**: append-only, time-ordered record table with indexed lookup
//!   by timestamp and customer
//! - **Ingestion**: drafts are timestamped, assigned an id, and persisted
//! - **Sessions**: one polling task per consumer, pushing filtered records
//!   in `(sent_at, id)` order until stopped
//! - **Retention**: a background sweep deletes records past the horizon
//!
//! ## Example
//!
//! ```ignore
//! use logrelay::{
//!     IngestionGate, Level, RecordDraft, Store, StoreConfig, SubscriptionBroker,
//! };
//! use std::sync::Arc;
//!
//! let store = Arc::new(Store::open_or_create(StoreConfig {
//!     path: "./logstore".into(),
//!     ..Default::default()
//! })?);
//!
//! let gate = IngestionGate::new(Arc::clone(&store));
//! gate.ingest(
//!     RecordDraft::new(Level::ERROR)
//!         .with_customer("cust1")
//!         .with_message("disk full"),
//! )?;
//!
//! let broker = SubscriptionBroker::new(store);
//! let session = broker.start(Default::default());
//! ```

pub mod error;
pub mod ingest;
pub mod query;
pub mod records;
pub mod retention;
pub mod sessions;
pub mod store;
pub mod types;

// Re-exports
pub use error::{Result, StoreError};
pub use ingest::IngestionGate;
pub use query::QueryService;
pub use records::{RecordIndex, RecordLog};
pub use retention::{RetentionConfig, RetentionSweeper};
pub use sessions::{
    SessionConfig, SessionEvent, SessionFilter, SessionHandle, SessionId, SessionState,
    StopReason, SubscriptionBroker, WatermarkAdvance,
};
pub use store::{Store, StoreConfig};
pub use types::*;
