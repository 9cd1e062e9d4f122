//! Entry store contract.
//!
//! This module defines the abstract interface that persisted key-value stores
//! of diary entries must implement. The index, query and mutation layers
//! interact with storage only through this trait, so the on-disk format stays
//! a detail of each implementation.
//!
//! ## Implementations
//!
//! - [`MemoryStore`]: a plain in-memory map, for tests and embedders
//! - [`FileStore`](crate::persistence::FileStore): a single-file persisted store

use crate::error::Result;
use crate::types::{DiaryEntry, EntryId};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Abstract trait for diary entry stores.
///
/// The store is the single source of truth. Everything the index holds can be
/// recomputed from `values()`.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync`; all methods take `&self` and use
/// interior locking.
///
/// ## Error Handling
///
/// A missing id is `Ok(None)` from `get`, never an error. Failures of the
/// underlying medium are reported as `DiaryError::Storage`, and a store that
/// cannot be read at all (format or schema mismatch) reports an error whose
/// `requires_recreate()` is true. Implementation-specific error types must not
/// leak out of these methods.
pub trait EntryStore: Send + Sync {
    /// Look up one entry by id.
    fn get(&self, id: &EntryId) -> Result<Option<DiaryEntry>>;

    /// Insert or replace the entry stored under `id`.
    fn put(&self, id: &EntryId, entry: &DiaryEntry) -> Result<()>;

    /// Remove the entry stored under `id`. Removing a missing id is not an error.
    fn delete(&self, id: &EntryId) -> Result<()>;

    /// All stored entries, in no particular order.
    fn values(&self) -> Result<Vec<DiaryEntry>>;

    /// Number of stored entries.
    fn count(&self) -> Result<usize>;

    /// Short name of the implementation, for logs
    fn name(&self) -> &'static str;
}

/// In-memory entry store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<EntryId, DiaryEntry>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-filled with entries
    pub fn with_entries(entries: impl IntoIterator<Item = DiaryEntry>) -> Self {
        let map = entries.into_iter().map(|e| (e.id, e)).collect();
        MemoryStore {
            entries: RwLock::new(map),
        }
    }
}

impl EntryStore for MemoryStore {
    fn get(&self, id: &EntryId) -> Result<Option<DiaryEntry>> {
        Ok(self.entries.read().get(id).cloned())
    }

    fn put(&self, id: &EntryId, entry: &DiaryEntry) -> Result<()> {
        self.entries.write().insert(*id, entry.clone());
        Ok(())
    }

    fn delete(&self, id: &EntryId) -> Result<()> {
        self.entries.write().remove(id);
        Ok(())
    }

    fn values(&self) -> Result<Vec<DiaryEntry>> {
        Ok(self.entries.read().values().cloned().collect())
    }

    fn count(&self) -> Result<usize> {
        Ok(self.entries.read().len())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
