//! Record log implementation.
//!
//! Records are stored in an append-only log file with in-memory time and
//! customer indexes rebuilt on open.

mod index;
mod log;

pub use index::RecordIndex;
pub use log::{RecordIterator, RecordLog};
