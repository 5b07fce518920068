use crate::storage::replication::{DEFAULT_DRAIN_BATCH_SIZE, DEFAULT_DRAIN_INTERVAL};
use crate::storage::wal::DEFAULT_WAL_CAPACITY;
use std::path::PathBuf;
use std::time::Duration;

/// Gateway configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Address the HTTP server binds to
    pub listen_addr: String,

    /// Path of the SQLite file holding the replicated write log
    pub store_path: PathBuf,

    /// Time between drains of the write-ahead log buffer
    pub drain_interval: Duration,

    /// Maximum records persisted per drain
    pub drain_batch_size: usize,

    /// Maximum records staged in the write-ahead log buffer
    pub wal_capacity: usize,
}

impl GatewayConfig {
    pub fn new(store_path: impl Into<PathBuf>) -> Self {
        Self {
            listen_addr: "0.0.0.0:6000".to_string(),
            store_path: store_path.into(),
            drain_interval: DEFAULT_DRAIN_INTERVAL,
            drain_batch_size: DEFAULT_DRAIN_BATCH_SIZE,
            wal_capacity: DEFAULT_WAL_CAPACITY,
        }
    }

    /// Set the listen address
    pub fn listen_addr(mut self, addr: &str) -> Self {
        self.listen_addr = addr.to_string();
        self
    }

    /// Set the drain interval
    pub fn drain_interval(mut self, interval: Duration) -> Self {
        self.drain_interval = interval;
        self
    }

    /// Set the drain batch size
    pub fn drain_batch_size(mut self, size: usize) -> Self {
        self.drain_batch_size = size;
        self
    }

    /// Set the write-ahead log buffer capacity
    pub fn wal_capacity(mut self, capacity: usize) -> Self {
        self.wal_capacity = capacity;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.listen_addr.is_empty() {
            return Err("listen_addr cannot be empty".to_string());
        }

        if self.store_path.as_os_str().is_empty() {
            return Err("store_path cannot be empty".to_string());
        }

        if self.drain_interval.is_zero() {
            return Err("drain_interval must be > 0".to_string());
        }

        if self.drain_batch_size == 0 {
            return Err("drain_batch_size must be > 0".to_string());
        }

        if self.wal_capacity < self.drain_batch_size {
            return Err("wal_capacity cannot be smaller than drain_batch_size".to_string());
        }

        Ok(())
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::new("./memgate.logs.sqlite3")
    }
}
