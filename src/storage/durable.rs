//! On-disk backing store for the replicated write log.

use crate::core::{DbError, LogRecord, Result};
use rusqlite::backup::Backup;
use rusqlite::{Connection, params};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

pub(crate) const LOG_SCHEMA: &str = "CREATE TABLE IF NOT EXISTS logs (
    id INTEGER PRIMARY KEY,
    tenant TEXT NOT NULL,
    request TEXT NOT NULL,
    time INTEGER NOT NULL
)";

const BACKUP_PAGES_PER_STEP: std::os::raw::c_int = 256;

/// Destination of drained write-log batches.
pub trait DurableLog: Send + Sync {
    /// Durably writes `records` as one atomic batch.
    ///
    /// Writing a record whose sequence id is already stored must not create a
    /// second copy.
    fn persist_batch(&self, records: &[LogRecord]) -> Result<()>;
}

/// SQLite file holding the `logs` table.
pub struct LogStore {
    path: PathBuf,
    conn: Mutex<Connection>,
}

impl LogStore {
    /// Opens or creates the store and ensures its schema exists.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                DbError::IoError(format!("Failed to create store directory: {}", e))
            })?;
        }

        let conn = Connection::open(&path).map_err(|e| {
            DbError::Replication(format!("Failed to open store {}: {}", path.display(), e))
        })?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
            .and_then(|_| conn.execute_batch(LOG_SCHEMA))
            .map_err(|e| DbError::Replication(format!("Failed to initialize store: {}", e)))?;

        Ok(Self {
            path,
            conn: Mutex::new(conn),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn row_count(&self) -> Result<u64> {
        let conn = self.conn.lock()?;
        count_logs(&conn)
    }

    /// All persisted records in ascending id order.
    pub fn records(&self) -> Result<Vec<LogRecord>> {
        let conn = self.conn.lock()?;
        read_logs(&conn)
    }

    /// Copies the entire store into `dst` with SQLite's online backup.
    pub fn backup_into(&self, dst: &mut Connection) -> Result<()> {
        let conn = self.conn.lock()?;
        let backup = Backup::new(&conn, dst)
            .map_err(|e| DbError::Recovery(format!("Failed to start backup: {}", e)))?;
        backup
            .run_to_completion(BACKUP_PAGES_PER_STEP, Duration::ZERO, None)
            .map_err(|e| DbError::Recovery(format!("Backup failed: {}", e)))
    }
}

impl DurableLog for LogStore {
    fn persist_batch(&self, records: &[LogRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn.lock()?;
        let tx = conn
            .transaction()
            .map_err(|e| DbError::Replication(format!("Failed to begin batch: {}", e)))?;
        {
            // The sequence id is the primary key, so a replayed batch is ignored
            // row by row instead of duplicated.
            let mut stmt = tx
                .prepare_cached(
                    "INSERT OR IGNORE INTO logs (id, tenant, request, time) VALUES (?1, ?2, ?3, ?4)",
                )
                .map_err(|e| DbError::Replication(format!("Failed to prepare batch: {}", e)))?;
            for record in records {
                let id = i64::try_from(record.sequence_id).map_err(|_| {
                    DbError::Replication(format!("Sequence id {} out of range", record.sequence_id))
                })?;
                stmt.execute(params![id, record.tenant, record.request, record.time])
                    .map_err(|e| {
                        DbError::Replication(format!(
                            "Failed to write record {}: {}",
                            record.sequence_id, e
                        ))
                    })?;
            }
        }
        tx.commit()
            .map_err(|e| DbError::Replication(format!("Failed to commit batch: {}", e)))
    }
}

pub(crate) fn count_logs(conn: &Connection) -> Result<u64> {
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM logs", [], |row| row.get(0))
        .map_err(|e| DbError::Recovery(format!("Failed to count log rows: {}", e)))?;
    Ok(count.max(0) as u64)
}

pub(crate) fn read_logs(conn: &Connection) -> Result<Vec<LogRecord>> {
    let mut stmt = conn
        .prepare("SELECT id, tenant, request, time FROM logs ORDER BY id")
        .map_err(|e| DbError::Recovery(format!("Failed to read log: {}", e)))?;
    let rows = stmt
        .query_map([], |row| {
            Ok(LogRecord {
                sequence_id: row.get::<_, i64>(0)?.max(0) as u64,
                tenant: row.get(1)?,
                request: row.get(2)?,
                time: row.get(3)?,
            })
        })
        .map_err(|e| DbError::Recovery(format!("Failed to read log: {}", e)))?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| DbError::Recovery(format!("Failed to decode log row: {}", e)))
}
