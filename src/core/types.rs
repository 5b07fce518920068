use super::{DbError, Result, Value};
use serde::{Deserialize, Serialize};

/// A parameterized statement submitted against a tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteRequest {
    pub query: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

impl WriteRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, V>(query: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            query: query.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    /// Rejects requests that must never reach the storage layer.
    pub fn validate(&self) -> Result<()> {
        if self.query.trim().is_empty() {
            return Err(DbError::Validation("empty query specified".to_string()));
        }
        Ok(())
    }
}

pub fn validate_tenant_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(DbError::Validation("empty database name specified".to_string()));
    }
    Ok(())
}

/// A staged write, keyed by its sequence id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub sequence_id: u64,
    pub tenant: String,
    /// JSON encoding of the [`WriteRequest`].
    pub request: String,
    /// Unix time in nanoseconds at which the record was staged.
    pub time: i64,
}

impl LogRecord {
    pub fn new(sequence_id: u64, tenant: &str, request: &WriteRequest) -> Result<Self> {
        Ok(Self::from_encoded(
            sequence_id,
            tenant.to_string(),
            Self::encode_request(request)?,
        ))
    }

    pub(crate) fn from_encoded(sequence_id: u64, tenant: String, request: String) -> Self {
        Self {
            sequence_id,
            tenant,
            request,
            time: chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default(),
        }
    }

    pub(crate) fn encode_request(request: &WriteRequest) -> Result<String> {
        serde_json::to_string(request)
            .map_err(|e| DbError::Staging(format!("Failed to serialize write request: {}", e)))
    }

    pub fn decode_request(&self) -> Result<WriteRequest> {
        serde_json::from_str(&self.request).map_err(|e| {
            DbError::Recovery(format!(
                "Failed to decode log record {}: {}",
                self.sequence_id, e
            ))
        })
    }
}
