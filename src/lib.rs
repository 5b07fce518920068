// ============================================================================
// memgate: multi-tenant SQL gateway
// ============================================================================
//
// Each tenant is an in-memory SQLite database. Writes are applied in memory,
// staged in a write-ahead log buffer and drained to a SQLite file in the
// background. On startup the file is copied back into memory and replayed.

pub mod config;
pub mod core;
pub mod facade;
pub mod result;
pub mod storage;
pub mod web;

pub use config::GatewayConfig;
pub use crate::core::{DbError, LogRecord, Result, Value, WriteRequest};
pub use facade::{Gateway, GatewayStatus};
pub use result::{Row, WriteResult};
pub use storage::{
    DrainOutcome, DurableLog, LogStore, Primary, QueryExecutor, ReplicationWorker, Replicator,
    TenantRegistry, WalBuffer, WalReservation,
};
