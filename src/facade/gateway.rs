use crate::config::GatewayConfig;
use crate::core::{DbError, Result, WriteRequest, validate_tenant_name};
use crate::result::{Row, WriteResult};
use crate::storage::{
    LogStore, Primary, QueryExecutor, ReplicationWorker, Replicator, TenantRegistry, WalBuffer,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Point-in-time view of the gateway's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GatewayStatus {
    pub databases: usize,
    pub pending_writes: usize,
    pub next_sequence_id: u64,
    /// Log records replayed from the backing store at startup.
    pub recovered_records: u64,
}

/// Entry point for tenant reads and writes.
///
/// A write first claims a slot in the write-ahead log buffer, then applies to
/// the tenant's in-memory database and is staged in the claimed slot; the
/// replication worker persists it later.
pub struct Gateway {
    registry: Arc<TenantRegistry>,
    wal: Arc<WalBuffer>,
    replicator: Arc<Replicator>,
    drain_interval: Duration,
    recovered_records: u64,
}

impl Gateway {
    /// Recovers prior state from the backing store and builds the gateway.
    ///
    /// Any failure here means the gateway must not serve traffic.
    pub fn open(config: &GatewayConfig) -> Result<Self> {
        config.validate().map_err(DbError::Validation)?;

        let registry = Arc::new(TenantRegistry::new());
        let store = LogStore::open(&config.store_path).map_err(|e| {
            DbError::Recovery(format!("Failed to open backing store: {}", e))
        })?;
        // The primary is dropped once replayed.
        let (recovered_records, next_sequence_id) = {
            let primary = Primary::restore_from(&store)?;
            primary.replay_into(&registry)?;
            (primary.log_rows(), primary.next_sequence_id())
        };

        let wal = Arc::new(WalBuffer::starting_at(
            next_sequence_id,
            config.wal_capacity,
        ));
        let replicator = Arc::new(Replicator::new(
            Arc::clone(&wal),
            Arc::new(store),
            config.drain_batch_size,
        ));

        info!(
            tenants = registry.len()?,
            recovered_records,
            next_sequence_id,
            "gateway recovered"
        );
        Ok(Self {
            registry,
            wal,
            replicator,
            drain_interval: config.drain_interval,
            recovered_records,
        })
    }

    /// Builds a gateway from already constructed parts, skipping recovery.
    pub fn from_parts(
        registry: Arc<TenantRegistry>,
        replicator: Arc<Replicator>,
        drain_interval: Duration,
    ) -> Self {
        Self {
            registry,
            wal: Arc::clone(replicator.wal()),
            replicator,
            drain_interval,
            recovered_records: 0,
        }
    }

    /// Runs a write statement against `tenant`.
    ///
    /// A full buffer or an unencodable request rejects the write before it
    /// touches the tenant, so every applied write has a log record. If the
    /// claimed slot cannot be committed the error is
    /// [`DbError::AppliedNotDurable`], which still carries the result.
    pub fn write(&self, tenant: &str, request: &WriteRequest) -> Result<WriteResult> {
        validate_tenant_name(tenant)?;
        request.validate()?;

        let reservation = self.wal.reserve(tenant, request)?;
        let db = self.registry.resolve(tenant)?;
        // Committed under the tenant lock so the log keeps the apply order.
        let (result, staged) =
            QueryExecutor::execute_write_with(&db, request, move |_| reservation.commit())?;

        match staged {
            Ok(_) => Ok(result),
            Err(err) => {
                warn!(tenant, error = %err, "write applied but not staged for replication");
                Err(DbError::AppliedNotDurable {
                    result,
                    reason: err.to_string(),
                })
            }
        }
    }

    /// Runs a query against `tenant` and returns all matching rows.
    pub fn read(&self, tenant: &str, request: &WriteRequest) -> Result<Vec<Row>> {
        validate_tenant_name(tenant)?;
        request.validate()?;

        let db = self.registry.resolve(tenant)?;
        QueryExecutor::execute_read(&db, request)
    }

    pub fn databases(&self) -> Result<Vec<String>> {
        self.registry.databases()
    }

    pub fn status(&self) -> Result<GatewayStatus> {
        Ok(GatewayStatus {
            databases: self.registry.len()?,
            pending_writes: self.wal.len()?,
            next_sequence_id: self.wal.next_sequence_id()?,
            recovered_records: self.recovered_records,
        })
    }

    pub fn registry(&self) -> &Arc<TenantRegistry> {
        &self.registry
    }

    pub fn replicator(&self) -> &Arc<Replicator> {
        &self.replicator
    }

    /// Starts the background drain of the write-ahead log buffer.
    pub fn start_replication(&self) -> ReplicationWorker {
        Arc::clone(&self.replicator).spawn(self.drain_interval)
    }
}
