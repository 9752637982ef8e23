//! Background retention sweep.

use crate::error::Result;
use crate::store::Store;
use crate::types::Timestamp;
use crossbeam_channel::{bounded, select, tick, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// Retention configuration.
#[derive(Clone, Copy, Debug)]
pub struct RetentionConfig {
    /// Records older than this are eligible for deletion.
    pub window: Duration,

    /// How often the sweep runs.
    pub interval: Duration,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(30 * 24 * 60 * 60),
            interval: Duration::from_secs(60 * 60),
        }
    }
}

/// Periodic background task deleting records past the retention horizon.
///
/// A tick that fails is logged and does not stop subsequent ticks; the
/// sweep holds no lock beyond the single delete call, so ingestion is
/// never blocked for longer than that.
pub struct RetentionSweeper {
    stop: Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl RetentionSweeper {
    /// Spawn the sweep thread.
    pub fn spawn(store: Arc<Store>, config: RetentionConfig) -> Self {
        let (stop_tx, stop_rx) = bounded::<()>(1);

        let thread = thread::spawn(move || {
            let ticks = tick(config.interval);
            loop {
                select! {
                    recv(stop_rx) -> _ => break,
                    recv(ticks) -> _ => {
                        match Self::sweep_once(&store, config.window) {
                            Ok(0) => {}
                            Ok(removed) => debug!(removed, "retention sweep"),
                            Err(e) => warn!(error = %e, "retention sweep failed; retrying next tick"),
                        }
                    }
                }
            }
        });

        Self {
            stop: stop_tx,
            thread: Some(thread),
        }
    }

    /// Run a single sweep tick against `store`.
    ///
    /// Deletes everything older than `now - window`; returns the number of
    /// records removed.
    pub fn sweep_once(store: &Store, window: Duration) -> Result<u64> {
        let cutoff = Timestamp::now().minus(window);
        store.delete_before(cutoff)
    }

    /// Stop the sweep thread and wait for it to exit.
    pub fn shutdown(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        let _ = self.stop.try_send(());
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for RetentionSweeper {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}
