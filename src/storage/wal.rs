//! In-memory write-ahead log buffer.
//!
//! Accepted writes are staged here before the replication worker persists
//! them. Appends only touch memory; disk I/O happens on the drain side.

use crate::core::{DbError, LogRecord, Result, WriteRequest};
use std::collections::VecDeque;
use std::sync::Mutex;

pub const DEFAULT_WAL_CAPACITY: usize = 100_000;

struct WalState {
    records: VecDeque<LogRecord>,
    next_sequence_id: u64,
    // Slots claimed by writes that are still executing.
    reserved: usize,
}

pub struct WalBuffer {
    state: Mutex<WalState>,
    capacity: usize,
}

impl WalBuffer {
    pub fn new(capacity: usize) -> Self {
        Self::starting_at(1, capacity)
    }

    /// Creates a buffer whose first record gets `next_sequence_id`.
    ///
    /// After recovery this is one past the highest persisted id so ids are
    /// never reused across restarts.
    pub fn starting_at(next_sequence_id: u64, capacity: usize) -> Self {
        Self {
            state: Mutex::new(WalState {
                records: VecDeque::new(),
                next_sequence_id: next_sequence_id.max(1),
                reserved: 0,
            }),
            capacity,
        }
    }

    /// Stages a write and returns its sequence id.
    pub fn append(&self, tenant: &str, request: &WriteRequest) -> Result<u64> {
        self.reserve(tenant, request)?.commit()
    }

    /// Encodes `request` and claims a slot for it without staging it yet.
    ///
    /// Fails with [`DbError::BufferFull`] when staged plus reserved records
    /// reach capacity. Dropping the reservation releases the slot.
    pub fn reserve(&self, tenant: &str, request: &WriteRequest) -> Result<WalReservation<'_>> {
        let request = LogRecord::encode_request(request)?;

        let mut state = self.state.lock()?;
        if state.records.len() + state.reserved >= self.capacity {
            return Err(DbError::BufferFull {
                capacity: self.capacity,
            });
        }
        state.reserved += 1;

        Ok(WalReservation {
            wal: self,
            tenant: tenant.to_string(),
            request,
            committed: false,
        })
    }

    /// Up to `limit` records with the lowest sequence ids, in ascending order.
    pub fn oldest(&self, limit: usize) -> Result<Vec<LogRecord>> {
        let state = self.state.lock()?;
        Ok(state.records.iter().take(limit).cloned().collect())
    }

    /// Removes every record with a sequence id at or below `sequence_id`.
    ///
    /// Records appended after a batch was read always carry higher ids, so
    /// they survive the prune.
    pub fn prune_through(&self, sequence_id: u64) -> Result<usize> {
        let mut state = self.state.lock()?;
        let mut pruned = 0;
        while state
            .records
            .front()
            .is_some_and(|record| record.sequence_id <= sequence_id)
        {
            state.records.pop_front();
            pruned += 1;
        }
        Ok(pruned)
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.state.lock()?.records.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn next_sequence_id(&self) -> Result<u64> {
        Ok(self.state.lock()?.next_sequence_id)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// A claimed slot in a [`WalBuffer`].
///
/// The sequence id is assigned on commit, so records stay ordered by the
/// time they were staged.
pub struct WalReservation<'a> {
    wal: &'a WalBuffer,
    tenant: String,
    request: String,
    committed: bool,
}

impl WalReservation<'_> {
    /// Stages the reserved record and returns its sequence id.
    pub fn commit(mut self) -> Result<u64> {
        let wal = self.wal;
        let mut state = wal.state.lock()?;
        let sequence_id = state.next_sequence_id;
        let record = LogRecord::from_encoded(
            sequence_id,
            std::mem::take(&mut self.tenant),
            std::mem::take(&mut self.request),
        );
        state.records.push_back(record);
        state.next_sequence_id += 1;
        state.reserved -= 1;
        self.committed = true;
        Ok(sequence_id)
    }
}

impl Drop for WalReservation<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        if let Ok(mut state) = self.wal.state.lock() {
            state.reserved -= 1;
        }
    }
}

impl Default for WalBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_WAL_CAPACITY)
    }
}
