//! Session types for streaming subscriptions.

use crate::types::{CustomerFilter, LevelFilter, LogRecord};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Unique identifier for a streaming session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SessionId(pub u64);

/// How a session advances its watermark after a delivery cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum WatermarkAdvance {
    /// Advance to the wall-clock time at the end of delivery.
    ///
    /// A record whose `sent_at` falls between poll start and the watermark
    /// update, but which was not yet visible to the poll query, is never
    /// redelivered once the watermark passes it - at-most-once semantics.
    #[default]
    WallClock,

    /// Advance only to the maximum `sent_at` actually delivered.
    ///
    /// Closes the wall-clock gap at the cost of re-scanning an idle range
    /// while no records arrive.
    LastDelivered,
}

/// Filter pair recorded at session start.
#[derive(Clone, Debug)]
pub struct SessionFilter {
    pub customer: CustomerFilter,
    pub levels: LevelFilter,
}

impl SessionFilter {
    pub fn new(customer: CustomerFilter, levels: LevelFilter) -> Self {
        Self { customer, levels }
    }
}

impl Default for SessionFilter {
    fn default() -> Self {
        Self {
            customer: CustomerFilter::All,
            levels: LevelFilter::ALL,
        }
    }
}

/// Configuration for a streaming session.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Filter criteria.
    pub filter: SessionFilter,

    /// How long to sleep between poll cycles.
    /// Default: 1 second
    pub poll_interval: Duration,

    /// Max buffered events before delivery applies backpressure.
    /// Default: 256
    pub buffer_size: usize,

    /// Watermark advancement policy.
    pub advance: WatermarkAdvance,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            filter: SessionFilter::default(),
            poll_interval: Duration::from_secs(1),
            buffer_size: 256,
            advance: WatermarkAdvance::default(),
        }
    }
}

/// Session lifecycle states. There is no transition out of `Stopped`; a
/// new start request always creates a new session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Starting,
    Streaming,
    Stopped,
}

/// Why a session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The consumer asked to stop.
    Requested,
    /// The transport dropped the receiving end.
    Disconnected,
}

/// Events pushed to a consumer.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A matching record, in `(sent_at, id)` order.
    Record { record: LogRecord },

    /// The session terminated; no further events follow.
    Stopped { reason: StopReason },
}

/// Consumer end of a session.
pub struct SessionHandle {
    pub id: SessionId,
    /// Channel to receive events.
    pub receiver: crossbeam_channel::Receiver<SessionEvent>,
}

impl SessionHandle {
    /// Receive the next event (blocking).
    pub fn recv(&self) -> Result<SessionEvent, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Result<SessionEvent, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: Duration,
    ) -> Result<SessionEvent, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}
