//! Background drain of the write-ahead log buffer into the backing store.

use crate::core::{DbError, Result};
use crate::storage::durable::DurableLog;
use crate::storage::wal::WalBuffer;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

pub const DEFAULT_DRAIN_BATCH_SIZE: usize = 1000;
pub const DEFAULT_DRAIN_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Records persisted and pruned; carries the batch's highest sequence id.
    Persisted { records: usize, through: u64 },
    /// Nothing was pending.
    Idle,
    /// Another drain was still running.
    Skipped,
}

/// Moves staged records from the buffer into durable storage, oldest first.
pub struct Replicator {
    wal: Arc<WalBuffer>,
    store: Arc<dyn DurableLog>,
    batch_size: usize,
    in_flight: AtomicBool,
}

struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Replicator {
    pub fn new(wal: Arc<WalBuffer>, store: Arc<dyn DurableLog>, batch_size: usize) -> Self {
        Self {
            wal,
            store,
            batch_size: batch_size.max(1),
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn wal(&self) -> &Arc<WalBuffer> {
        &self.wal
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Runs one drain cycle.
    ///
    /// On a failed write nothing is pruned and the same records are offered
    /// again on the next cycle.
    pub async fn drain_once(&self) -> Result<DrainOutcome> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(DrainOutcome::Skipped);
        }
        let _guard = InFlight(&self.in_flight);

        let batch = self.wal.oldest(self.batch_size)?;
        let Some(through) = batch.last().map(|record| record.sequence_id) else {
            return Ok(DrainOutcome::Idle);
        };
        let records = batch.len();

        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.persist_batch(&batch))
            .await
            .map_err(|e| DbError::Replication(format!("drain task join: {}", e)))??;

        self.wal.prune_through(through)?;
        debug!(records, through, "drained write-ahead log batch");
        Ok(DrainOutcome::Persisted { records, through })
    }

    /// Drains until the buffer is empty or a cycle fails.
    pub async fn flush(&self) -> Result<usize> {
        let mut total = 0;
        loop {
            match self.drain_once().await? {
                DrainOutcome::Persisted { records, .. } => total += records,
                DrainOutcome::Idle | DrainOutcome::Skipped => return Ok(total),
            }
        }
    }

    /// Starts the periodic drain task.
    pub fn spawn(self: Arc<Self>, period: Duration) -> ReplicationWorker {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let replicator = self;
        let period = period.max(Duration::from_millis(10));

        let join_handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = &mut stop_rx => {
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(err) = replicator.drain_once().await {
                            let pending = replicator.wal.len().unwrap_or_default();
                            warn!(error = %err, pending, "write-ahead log drain failed, will retry");
                        }
                    }
                }
            }

            match replicator.flush().await {
                Ok(records) => info!(records, "replication worker stopped"),
                Err(err) => warn!(error = %err, "final drain before shutdown failed"),
            }
        });

        ReplicationWorker {
            stop_tx: Some(stop_tx),
            join_handle: Some(join_handle),
        }
    }
}

/// Handle to the running drain task.
pub struct ReplicationWorker {
    stop_tx: Option<oneshot::Sender<()>>,
    join_handle: Option<JoinHandle<()>>,
}

impl ReplicationWorker {
    /// Signals the worker to stop, waits for its final drain and exit.
    pub async fn stop(mut self) -> Result<()> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }

        if let Some(join_handle) = self.join_handle.take() {
            join_handle
                .await
                .map_err(|err| DbError::Replication(format!("replication worker join: {}", err)))?;
        }
        Ok(())
    }
}

impl Drop for ReplicationWorker {
    fn drop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(join_handle) = self.join_handle.take() {
            join_handle.abort();
        }
    }
}
