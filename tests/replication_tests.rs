//! Write-ahead log drain behaviour
//!
//! Run with: cargo test --test replication_tests

use memgate::{
    DbError, DrainOutcome, DurableLog, LogRecord, LogStore, Replicator, Result, WalBuffer,
    WriteRequest,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::time::Duration;
use tempfile::TempDir;

fn insert(n: i64) -> WriteRequest {
    WriteRequest::new("INSERT INTO t VALUES (?)").arg(n)
}

/// Records the sequence ids of every batch it is given.
#[derive(Default)]
struct RecordingLog {
    batches: Mutex<Vec<Vec<u64>>>,
}

impl DurableLog for RecordingLog {
    fn persist_batch(&self, records: &[LogRecord]) -> Result<()> {
        self.batches
            .lock()
            .unwrap()
            .push(records.iter().map(|r| r.sequence_id).collect());
        Ok(())
    }
}

/// Fails the first `failures` batches. With `commit_before_failing` the batch
/// reaches the inner store before the error is reported, like a lost ack.
struct FlakyLog {
    inner: LogStore,
    failures: AtomicUsize,
    commit_before_failing: bool,
}

impl DurableLog for FlakyLog {
    fn persist_batch(&self, records: &[LogRecord]) -> Result<()> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            if self.commit_before_failing {
                self.inner.persist_batch(records)?;
            }
            return Err(DbError::Replication("disk unavailable".to_string()));
        }
        self.inner.persist_batch(records)
    }
}

#[tokio::test]
async fn test_batches_drain_in_sequence_order() {
    let wal = Arc::new(WalBuffer::new(100));
    let log = Arc::new(RecordingLog::default());
    let replicator = Replicator::new(Arc::clone(&wal), log.clone(), 4);

    for i in 0..10 {
        wal.append("t", &insert(i)).unwrap();
    }

    assert_eq!(replicator.flush().await.unwrap(), 10);
    assert!(wal.is_empty().unwrap());

    let batches = log.batches.lock().unwrap().clone();
    assert_eq!(batches, vec![vec![1, 2, 3, 4], vec![5, 6, 7, 8], vec![9, 10]]);
}

#[tokio::test]
async fn test_idle_buffer_drains_nothing() {
    let wal = Arc::new(WalBuffer::new(10));
    let replicator = Replicator::new(wal, Arc::new(RecordingLog::default()), 4);
    assert_eq!(replicator.drain_once().await.unwrap(), DrainOutcome::Idle);
}

#[tokio::test]
async fn test_failed_batch_stays_buffered() {
    let temp_dir = TempDir::new().unwrap();
    let store = LogStore::open(temp_dir.path().join("store.sqlite3")).unwrap();
    let flaky = Arc::new(FlakyLog {
        inner: store,
        failures: AtomicUsize::new(1),
        commit_before_failing: false,
    });
    let wal = Arc::new(WalBuffer::new(10));
    let replicator = Replicator::new(Arc::clone(&wal), flaky.clone(), 10);

    for i in 0..3 {
        wal.append("t", &insert(i)).unwrap();
    }

    let err = replicator.drain_once().await.unwrap_err();
    assert!(matches!(err, DbError::Replication(_)));
    assert_eq!(wal.len().unwrap(), 3);
    assert_eq!(flaky.inner.row_count().unwrap(), 0);

    assert_eq!(
        replicator.drain_once().await.unwrap(),
        DrainOutcome::Persisted {
            records: 3,
            through: 3
        }
    );
    assert!(wal.is_empty().unwrap());
    assert_eq!(flaky.inner.row_count().unwrap(), 3);
}

#[tokio::test]
async fn test_retry_after_lost_ack_does_not_duplicate() {
    let temp_dir = TempDir::new().unwrap();
    let store = LogStore::open(temp_dir.path().join("store.sqlite3")).unwrap();
    let flaky = Arc::new(FlakyLog {
        inner: store,
        failures: AtomicUsize::new(1),
        commit_before_failing: true,
    });
    let wal = Arc::new(WalBuffer::new(10));
    let replicator = Replicator::new(Arc::clone(&wal), flaky.clone(), 10);

    for i in 0..4 {
        wal.append("t", &insert(i)).unwrap();
    }

    assert!(replicator.drain_once().await.is_err());
    assert_eq!(wal.len().unwrap(), 4);

    // Appended between the failed attempt and the retry.
    wal.append("t", &insert(99)).unwrap();
    assert_eq!(replicator.flush().await.unwrap(), 5);

    let ids: Vec<u64> = flaky
        .inner
        .records()
        .unwrap()
        .iter()
        .map(|r| r.sequence_id)
        .collect();
    assert_eq!(ids, vec![1, 2, 3, 4, 5]);
}

/// Blocks inside `persist_batch` until released.
struct GatedLog {
    entered: tokio::sync::mpsc::UnboundedSender<()>,
    release: Mutex<mpsc::Receiver<()>>,
}

impl DurableLog for GatedLog {
    fn persist_batch(&self, _records: &[LogRecord]) -> Result<()> {
        let _ = self.entered.send(());
        let _ = self.release.lock().unwrap().recv();
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_overlapping_drain_is_skipped() {
    let (entered_tx, mut entered_rx) = tokio::sync::mpsc::unbounded_channel();
    let (release_tx, release_rx) = mpsc::channel();
    let wal = Arc::new(WalBuffer::new(10));
    let replicator = Arc::new(Replicator::new(
        Arc::clone(&wal),
        Arc::new(GatedLog {
            entered: entered_tx,
            release: Mutex::new(release_rx),
        }),
        10,
    ));
    wal.append("t", &insert(1)).unwrap();

    let first = {
        let replicator = Arc::clone(&replicator);
        tokio::spawn(async move { replicator.drain_once().await })
    };
    entered_rx.recv().await.unwrap();

    assert_eq!(replicator.drain_once().await.unwrap(), DrainOutcome::Skipped);

    release_tx.send(()).unwrap();
    assert_eq!(
        first.await.unwrap().unwrap(),
        DrainOutcome::Persisted {
            records: 1,
            through: 1
        }
    );
    assert!(wal.is_empty().unwrap());
}

#[tokio::test]
async fn test_worker_stop_flushes_pending_records() {
    let wal = Arc::new(WalBuffer::new(100));
    let log = Arc::new(RecordingLog::default());
    let replicator = Arc::new(Replicator::new(Arc::clone(&wal), log.clone(), 2));

    let worker = Arc::clone(&replicator).spawn(Duration::from_secs(3600));
    for i in 0..5 {
        wal.append("t", &insert(i)).unwrap();
    }
    worker.stop().await.unwrap();

    assert!(wal.is_empty().unwrap());
    let drained: Vec<u64> = log.batches.lock().unwrap().concat();
    assert_eq!(drained, vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn test_worker_drains_on_interval() {
    let wal = Arc::new(WalBuffer::new(100));
    let log = Arc::new(RecordingLog::default());
    let replicator = Arc::new(Replicator::new(Arc::clone(&wal), log.clone(), 100));

    let worker = Arc::clone(&replicator).spawn(Duration::from_millis(20));
    wal.append("t", &insert(1)).unwrap();

    let mut attempts = 0;
    while !wal.is_empty().unwrap() && attempts < 250 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        attempts += 1;
    }

    assert!(wal.is_empty().unwrap());
    assert_eq!(log.batches.lock().unwrap().concat(), vec![1]);
    worker.stop().await.unwrap();
}
