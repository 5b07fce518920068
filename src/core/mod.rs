pub mod error;
pub mod types;
pub mod value;

pub use error::{DbError, Result};
pub use types::{LogRecord, WriteRequest, validate_tenant_name};
pub use value::Value;
