use crate::result::WriteResult;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Statement error: {0}")]
    Statement(String),

    /// The statement ran against the tenant's in-memory database but the
    /// request could not be staged in the write-ahead log buffer.
    #[error("Write applied but not durably staged: {reason}")]
    AppliedNotDurable { result: WriteResult, reason: String },

    #[error("Write-ahead log buffer is full ({capacity} pending records)")]
    BufferFull { capacity: usize },

    #[error("Staging error: {0}")]
    Staging(String),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Replication error: {0}")]
    Replication(String),

    #[error("Recovery error: {0}")]
    Recovery(String),

    #[error("Lock error: {0}")]
    LockError(String),

    #[error("I/O error: {0}")]
    IoError(String),
}

impl DbError {
    /// Stable machine-readable code used in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::Statement(_) => "statement_error",
            Self::AppliedNotDurable { .. } => "not_durable",
            Self::BufferFull { .. } | Self::Staging(_) => "staging_error",
            Self::Engine(_) => "engine_error",
            Self::Replication(_) => "replication_error",
            Self::Recovery(_) => "recovery_error",
            Self::LockError(_) => "lock_error",
            Self::IoError(_) => "io_error",
        }
    }

    /// True for errors caused by the request itself rather than the gateway.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::Statement(_))
    }
}

pub type Result<T> = std::result::Result<T, DbError>;

impl<T> From<std::sync::PoisonError<T>> for DbError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Statement(err.to_string())
    }
}

impl From<std::io::Error> for DbError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}
