//! Startup recovery from the backing store.
//!
//! The store is copied in full into a fresh in-memory primary, checked for
//! completeness, then replayed record by record into the tenant databases.

use crate::core::{DbError, LogRecord, Result};
use crate::storage::durable::{LOG_SCHEMA, LogStore, count_logs, read_logs};
use crate::storage::executor::QueryExecutor;
use crate::storage::registry::TenantRegistry;
use rusqlite::Connection;
use std::sync::Mutex;
use tracing::info;

/// In-memory copy of the backing store taken before traffic starts.
pub struct Primary {
    conn: Mutex<Connection>,
    log_rows: u64,
    next_sequence_id: u64,
}

impl Primary {
    /// Copies `store` into a new in-memory database.
    ///
    /// Fails if the copy's row count differs from the store's.
    pub fn restore_from(store: &LogStore) -> Result<Self> {
        let mut conn = Connection::open_in_memory()
            .map_err(|e| DbError::Recovery(format!("Failed to open primary: {}", e)))?;
        store.backup_into(&mut conn)?;
        conn.execute_batch(LOG_SCHEMA)
            .map_err(|e| DbError::Recovery(format!("Failed to prepare primary: {}", e)))?;

        let expected = store.row_count()?;
        let log_rows = count_logs(&conn)?;
        if log_rows != expected {
            return Err(DbError::Recovery(format!(
                "primary holds {} log rows, store holds {}",
                log_rows, expected
            )));
        }

        let max_id: i64 = conn
            .query_row("SELECT COALESCE(MAX(id), 0) FROM logs", [], |row| row.get(0))
            .map_err(|e| DbError::Recovery(format!("Failed to read last sequence id: {}", e)))?;

        info!(
            store = %store.path().display(),
            log_rows,
            "restored primary from backing store"
        );
        Ok(Self {
            conn: Mutex::new(conn),
            log_rows,
            next_sequence_id: max_id.max(0) as u64 + 1,
        })
    }

    /// Number of log rows copied from the store.
    pub fn log_rows(&self) -> u64 {
        self.log_rows
    }

    /// Counts the primary's log rows directly.
    pub fn count_log_rows(&self) -> Result<u64> {
        let conn = self.conn.lock()?;
        count_logs(&conn)
    }

    /// First sequence id the write-ahead log buffer may hand out.
    pub fn next_sequence_id(&self) -> u64 {
        self.next_sequence_id
    }

    pub fn records(&self) -> Result<Vec<LogRecord>> {
        let conn = self.conn.lock()?;
        read_logs(&conn)
    }

    /// Re-applies every logged write, in sequence order, to its tenant.
    ///
    /// Returns the number of replayed records. Any failure aborts recovery.
    pub fn replay_into(&self, registry: &TenantRegistry) -> Result<usize> {
        let records = self.records()?;
        for record in &records {
            let request = record.decode_request()?;
            let db = registry.resolve(&record.tenant)?;
            QueryExecutor::execute_write(&db, &request).map_err(|e| {
                DbError::Recovery(format!(
                    "replaying record {} for '{}': {}",
                    record.sequence_id, record.tenant, e
                ))
            })?;
        }

        info!(
            records = records.len(),
            tenants = registry.len()?,
            "replayed write log into tenant databases"
        );
        Ok(records.len())
    }
}
