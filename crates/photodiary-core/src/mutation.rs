//! Mutation coordinator.
//!
//! Every write goes through here, in a fixed order: persist to the store, then
//! update the index, then publish a change event. A failed persist stops the
//! sequence, so the index and subscribers only ever see committed changes.
//!
//! Each mutation holds the index writer lock from the store write through the
//! index update. A lazy index build takes the same lock, so it either sees the
//! write in its snapshot or runs after the index update.

use crate::error::Result;
use crate::index::DiaryIndex;
use crate::notify::{ChangeEvent, ChangeNotifier};
use crate::store::EntryStore;
use crate::types::{DiaryEntry, EntryId, NewEntry};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Photo reference delta between two versions of an entry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhotoDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl PhotoDiff {
    /// Compare old and new photo lists.
    ///
    /// Each side keeps the order of the list it came from.
    pub fn between(old: &[String], new: &[String]) -> Self {
        PhotoDiff {
            added: new.iter().filter(|p| !old.contains(*p)).cloned().collect(),
            removed: old.iter().filter(|p| !new.contains(*p)).cloned().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Applies create, update and delete across store, index and notifier.
pub struct MutationCoordinator {
    store: Arc<dyn EntryStore>,
    index: Arc<DiaryIndex>,
    notifier: Arc<ChangeNotifier>,
}

impl MutationCoordinator {
    pub fn new(
        store: Arc<dyn EntryStore>,
        index: Arc<DiaryIndex>,
        notifier: Arc<ChangeNotifier>,
    ) -> Self {
        MutationCoordinator {
            store,
            index,
            notifier,
        }
    }

    /// Create and persist a new entry.
    ///
    /// The entry gets a fresh id and `created_at == updated_at == now`.
    #[instrument(skip(self, new), fields(date = %new.date))]
    pub fn create(&self, new: NewEntry) -> Result<DiaryEntry> {
        let _writer = self.index.write_lock();

        let entry = new.into_entry(EntryId::new(), Utc::now());
        self.store.put(&entry.id, &entry)?;

        // A build here already sees the new entry; the insert is idempotent
        self.index.ensure_built(self.store.as_ref())?;
        self.index.insert_entry(&entry);

        self.notifier
            .publish(ChangeEvent::created(entry.id, entry.photo_ids.clone()));
        info!(id = %entry.id, photos = entry.photo_ids.len(), "Entry created");
        Ok(entry)
    }

    /// Persist a modified entry.
    ///
    /// `updated_at` is set to now. An entry that was never stored is written
    /// anyway and still reported as an update, with every photo counted as
    /// added.
    #[instrument(skip(self, entry), fields(id = %entry.id))]
    pub fn update(&self, mut entry: DiaryEntry) -> Result<DiaryEntry> {
        let _writer = self.index.write_lock();

        let prior = self.store.get(&entry.id)?;
        if prior.is_none() {
            warn!("Updating an entry that was never stored");
        }
        let diff = PhotoDiff::between(
            prior.as_ref().map(|p| p.photo_ids.as_slice()).unwrap_or(&[]),
            &entry.photo_ids,
        );

        entry.updated_at = Utc::now();
        self.store.put(&entry.id, &entry)?;

        if self.index.is_built() {
            self.index.update_entry_date(&entry);
            self.index.update_entry_search_text(&entry);
        }

        debug!(
            added = diff.added.len(),
            removed = diff.removed.len(),
            "Photo references changed"
        );
        self.notifier
            .publish(ChangeEvent::updated(entry.id, diff.added, diff.removed));
        info!("Entry updated");
        Ok(entry)
    }

    /// Delete an entry.
    ///
    /// Returns the deleted entry, or `None` if nothing was stored under `id`.
    /// No event is published in that case.
    #[instrument(skip(self))]
    pub fn delete(&self, id: &EntryId) -> Result<Option<DiaryEntry>> {
        let _writer = self.index.write_lock();

        let Some(prior) = self.store.get(id)? else {
            if self.index.is_built() && self.index.remove_entry(id) {
                warn!("Dropped index entry with no stored entry");
            }
            debug!("Delete of unknown entry ignored");
            return Ok(None);
        };

        self.store.delete(id)?;

        if self.index.is_built() {
            self.index.remove_entry(id);
        }

        self.notifier
            .publish(ChangeEvent::deleted(*id, prior.photo_ids.clone()));
        info!("Entry deleted");
        Ok(Some(prior))
    }
}

impl std::fmt::Debug for MutationCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationCoordinator")
            .field("store", &self.store.name())
            .field("index", &self.index)
            .finish()
    }
}
