//! Batching recorder: drains the bus into the `task_events` table.
//!
//! Events are buffered and flushed when the batch reaches
//! `max_batch` or `flush_interval` elapses, whichever comes first. On
//! shutdown the recorder drains whatever the stream still holds, takes
//! a final flush, and exits.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use super::bus::EventBus;
use super::types::TaskEventRecord;
use crate::storage::Storage;

/// Default flush thresholds.
const DEFAULT_MAX_BATCH: usize = 100;
const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(2);

/// Handle to the background recorder task.
pub struct EventRecorder {
    handle: JoinHandle<()>,
    stop: Arc<Notify>,
}

impl EventRecorder {
    /// Spawn a recorder draining `bus` into `storage`.
    pub fn spawn(bus: &Arc<EventBus>, storage: Storage) -> Self {
        Self::spawn_with(bus, storage, DEFAULT_MAX_BATCH, DEFAULT_FLUSH_INTERVAL)
    }

    pub fn spawn_with(
        bus: &Arc<EventBus>,
        storage: Storage,
        max_batch: usize,
        flush_interval: Duration,
    ) -> Self {
        let mut rx = bus.subscribe();
        let bus = Arc::clone(bus);
        let stop = Arc::new(Notify::new());
        let stop_signal = Arc::clone(&stop);

        let handle = tokio::spawn(async move {
            let mut batch: Vec<TaskEventRecord> = Vec::with_capacity(max_batch);
            let mut ticker = tokio::time::interval(flush_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    received = rx.recv() => match received {
                        Ok(record) => {
                            batch.push(record);
                            if batch.len() >= max_batch {
                                flush(&storage, &mut batch).await;
                            }
                        }
                        Err(RecvError::Lagged(n)) => {
                            warn!("event recorder lagged, {n} events dropped from stream");
                            bus.note_lagged(n);
                        }
                        Err(RecvError::Closed) => {
                            flush(&storage, &mut batch).await;
                            debug!("event recorder exiting, bus closed");
                            return;
                        }
                    },
                    _ = ticker.tick() => {
                        flush(&storage, &mut batch).await;
                    }
                    _ = stop_signal.notified() => {
                        // Drain what the stream still holds, then stop.
                        loop {
                            match rx.try_recv() {
                                Ok(record) => batch.push(record),
                                Err(TryRecvError::Lagged(n)) => bus.note_lagged(n),
                                Err(_) => break,
                            }
                        }
                        flush(&storage, &mut batch).await;
                        debug!("event recorder stopped");
                        return;
                    }
                }
            }
        });

        Self { handle, stop }
    }

    /// Drain, flush, and stop the recorder.
    pub async fn finish(self) {
        self.stop.notify_one();
        if let Err(e) = self.handle.await {
            if !e.is_cancelled() {
                warn!("event recorder task failed: {e}");
            }
        }
    }
}

async fn flush(storage: &Storage, batch: &mut Vec<TaskEventRecord>) {
    if batch.is_empty() {
        return;
    }
    if let Err(e) = storage.insert_events(batch).await {
        // Persistence failure is non-fatal to the recorder; the events
        // are dropped from storage but were already streamed live.
        warn!("failed to persist {} task events: {e:#}", batch.len());
    }
    batch.clear();
}
