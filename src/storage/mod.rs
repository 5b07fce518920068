pub mod durable;
pub mod executor;
pub mod recovery;
pub mod registry;
pub mod replication;
pub mod wal;

pub use durable::{DurableLog, LogStore};
pub use executor::QueryExecutor;
pub use recovery::Primary;
pub use registry::{TenantDatabase, TenantHandle, TenantRegistry};
pub use replication::{DrainOutcome, ReplicationWorker, Replicator};
pub use wal::{WalBuffer, WalReservation};
