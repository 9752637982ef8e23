//! Streaming subscription sessions.
//!
//! Each connected consumer gets one ephemeral session that polls the store
//! for new matching records and pushes them in `(sent_at, id)` order until
//! stopped or disconnected.
//!
//! Sessions are independent: each owns its filters, watermark, delivery
//! queue, and cancellation signal. Stopping one never affects another.
//!
//! # Example
//!
//! ```ignore
//! let broker = SubscriptionBroker::new(store);
//!
//! let handle = broker.start(SessionConfig {
//!     filter: SessionFilter::new(
//!         CustomerFilter::parse("cust1"),
//!         LevelFilter::from(Level::WARNING) | Level::ERROR,
//!     ),
//!     ..Default::default()
//! });
//!
//! loop {
//!     match handle.recv() {
//!         Ok(SessionEvent::Record { record }) => println!("{:?}", record),
//!         Ok(SessionEvent::Stopped { .. }) | Err(_) => break,
//!     }
//! }
//! ```

mod broker;
mod types;

pub use broker::SubscriptionBroker;
pub use types::{
    SessionConfig, SessionEvent, SessionFilter, SessionHandle, SessionId, SessionState,
    StopReason, WatermarkAdvance,
};
