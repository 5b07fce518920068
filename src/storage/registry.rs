//! Tenant registry: one in-memory SQLite database per tenant name.

use crate::core::{DbError, Result};
use rusqlite::Connection;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tracing::debug;

pub type TenantHandle = Arc<TenantDatabase>;

/// An in-memory database owned by the registry.
///
/// SQLite connections are not `Sync`, so access goes through a mutex. That
/// mutex is the only serialization applied to a tenant's statements.
pub struct TenantDatabase {
    name: String,
    conn: Mutex<Connection>,
}

impl TenantDatabase {
    pub fn open_in_memory(name: &str) -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            DbError::Engine(format!("Failed to open database '{}': {}", name, e))
        })?;
        Ok(Self {
            name: name.to_string(),
            conn: Mutex::new(conn),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        Ok(self.conn.lock()?)
    }
}

impl std::fmt::Debug for TenantDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantDatabase").field("name", &self.name).finish()
    }
}

/// Maps tenant names to their databases, creating them on first use.
///
/// Handles are never evicted.
#[derive(Default)]
pub struct TenantRegistry {
    databases: RwLock<HashMap<String, TenantHandle>>,
}

impl TenantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the handle for `name`, creating it if this is the first reference.
    ///
    /// Concurrent callers resolving the same unseen name all get the same handle.
    pub fn resolve(&self, name: &str) -> Result<TenantHandle> {
        if let Some(db) = self.databases.read()?.get(name) {
            return Ok(Arc::clone(db));
        }

        let mut databases = self.databases.write()?;
        // Another caller may have created it between the two locks.
        if let Some(db) = databases.get(name) {
            return Ok(Arc::clone(db));
        }

        let db = Arc::new(TenantDatabase::open_in_memory(name)?);
        databases.insert(name.to_string(), Arc::clone(&db));
        debug!(tenant = name, tenants = databases.len(), "created tenant database");
        Ok(db)
    }

    pub fn get(&self, name: &str) -> Result<Option<TenantHandle>> {
        Ok(self.databases.read()?.get(name).cloned())
    }

    /// Sorted tenant names.
    pub fn databases(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.databases.read()?.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.databases.read()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}
