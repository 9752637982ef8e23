//! Subscription broker: one polling task per streaming consumer.

use crate::store::Store;
use crate::types::{LogRecord, Timestamp};
use crossbeam_channel::{bounded, select, Receiver, SendTimeoutError, Sender};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

use super::types::{
    SessionConfig, SessionEvent, SessionHandle, SessionId, SessionState, StopReason,
    WatermarkAdvance,
};

/// Control surface the broker keeps for a live session.
///
/// The stop channel is created at session start and owned by that session
/// alone; stopping one consumer can never affect another.
struct SessionControl {
    stop: Sender<()>,
    state: Arc<Mutex<SessionState>>,
}

/// Manages streaming sessions over a shared store.
///
/// Each session runs on its own thread: it polls the store for records
/// newer than its watermark, pushes matches into a bounded delivery queue
/// in `(sent_at, id)` order, and sleeps until the next cycle or a stop
/// signal. Sessions are fully independent; a transient store error during
/// a poll is logged and retried on the next tick.
pub struct SubscriptionBroker {
    store: Arc<Store>,
    /// Live sessions by ID. Sessions remove themselves on exit.
    sessions: Arc<RwLock<HashMap<SessionId, SessionControl>>>,
    /// Counter for generating session IDs.
    next_id: AtomicU64,
}

impl SubscriptionBroker {
    /// Create a broker over `store`.
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Start a new streaming session.
    ///
    /// The watermark is initialized to now: only records ingested after the
    /// start are delivered. Returns a handle for receiving events.
    pub fn start(&self, config: SessionConfig) -> SessionHandle {
        let id = SessionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (event_tx, event_rx) = bounded(config.buffer_size);
        let (stop_tx, stop_rx) = bounded(1);
        let state = Arc::new(Mutex::new(SessionState::Starting));

        self.sessions.write().insert(
            id,
            SessionControl {
                stop: stop_tx,
                state: Arc::clone(&state),
            },
        );

        let store = Arc::clone(&self.store);
        let sessions = Arc::clone(&self.sessions);
        thread::spawn(move || {
            run_session(id, &store, &config, &event_tx, &stop_rx, &state);
            sessions.write().remove(&id);
        });

        SessionHandle {
            id,
            receiver: event_rx,
        }
    }

    /// Signal a session to stop. Returns false if the session is unknown
    /// (never existed, or already terminated).
    pub fn stop(&self, id: SessionId) -> bool {
        match self.sessions.read().get(&id) {
            Some(control) => {
                let _ = control.stop.try_send(());
                true
            }
            None => false,
        }
    }

    /// Current state of a session, or None once it has terminated and been
    /// cleaned up.
    pub fn state(&self, id: SessionId) -> Option<SessionState> {
        self.sessions.read().get(&id).map(|c| *c.state.lock())
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }
}

/// Outcome of pushing one record into the delivery queue.
enum Delivery {
    Sent,
    Stopped,
    Disconnected,
}

/// The per-session poll loop.
fn run_session(
    id: SessionId,
    store: &Store,
    config: &SessionConfig,
    events: &Sender<SessionEvent>,
    stop: &Receiver<()>,
    state: &Mutex<SessionState>,
) {
    debug!(session = id.0, "session starting");

    let mut watermark = Timestamp::now();
    *state.lock() = SessionState::Streaming;

    let reason = 'session: loop {
        // Poll for records strictly newer than the watermark.
        match store.query_range(watermark.next(), config.filter.levels, &config.filter.customer)
        {
            Ok(batch) => {
                let mut last_delivered: Option<Timestamp> = None;
                for record in batch {
                    let sent_at = record.sent_at;
                    match deliver(events, stop, record, config.poll_interval) {
                        Delivery::Sent => last_delivered = Some(sent_at),
                        Delivery::Stopped => break 'session StopReason::Requested,
                        Delivery::Disconnected => break 'session StopReason::Disconnected,
                    }
                }

                watermark = match config.advance {
                    WatermarkAdvance::WallClock => Timestamp::now(),
                    WatermarkAdvance::LastDelivered => last_delivered.unwrap_or(watermark),
                };
            }
            Err(e) => {
                // Transient store errors never kill the session
                warn!(session = id.0, error = %e, "poll cycle failed; retrying next tick");
            }
        }

        select! {
            recv(stop) -> _ => break 'session StopReason::Requested,
            default(config.poll_interval) => {}
        }
    };

    *state.lock() = SessionState::Stopped;
    let _ = events.try_send(SessionEvent::Stopped { reason });
    debug!(session = id.0, ?reason, "session stopped");
}

/// Push one record, blocking in stop-aware slices while the queue is full.
fn deliver(
    events: &Sender<SessionEvent>,
    stop: &Receiver<()>,
    record: LogRecord,
    timeout: Duration,
) -> Delivery {
    let mut event = SessionEvent::Record { record };
    loop {
        match events.send_timeout(event, timeout) {
            Ok(()) => return Delivery::Sent,
            Err(SendTimeoutError::Timeout(returned)) => {
                if stop.try_recv().is_ok() {
                    return Delivery::Stopped;
                }
                event = returned;
            }
            Err(SendTimeoutError::Disconnected(_)) => return Delivery::Disconnected,
        }
    }
}
