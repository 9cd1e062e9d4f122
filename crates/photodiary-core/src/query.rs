//! Read-only query engine.
//!
//! Answers ordered, filtered and paginated queries from the [`DiaryIndex`],
//! resolving ids against the [`EntryStore`] as results are produced. Lookups
//! that the index does not cover (photo references, tag statistics) scan the
//! store directly.
//!
//! Reads never fail because the index is stale. An indexed id whose entry has
//! vanished from the store is logged and skipped.

use crate::error::Result;
use crate::filter::Filter;
use crate::index::DiaryIndex;
use crate::store::EntryStore;
use crate::types::{DiaryEntry, EntryId};
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Query front end over one store and its index.
#[derive(Clone)]
pub struct QueryEngine {
    store: Arc<dyn EntryStore>,
    index: Arc<DiaryIndex>,
}

impl std::fmt::Debug for QueryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryEngine")
            .field("store", &self.store.name())
            .field("index", &self.index)
            .finish()
    }
}

impl QueryEngine {
    pub fn new(store: Arc<dyn EntryStore>, index: Arc<DiaryIndex>) -> Self {
        QueryEngine { store, index }
    }

    fn ensure_index(&self) -> Result<()> {
        self.index.ensure_built(self.store.as_ref())
    }

    /// Resolve an indexed id, skipping ids the store no longer has.
    fn resolve(&self, id: &EntryId) -> Result<Option<DiaryEntry>> {
        let entry = self.store.get(id)?;
        if entry.is_none() {
            warn!(id = %id, "Indexed entry missing from store, skipping");
        }
        Ok(entry)
    }

    fn resolve_all(&self, ids: &[EntryId]) -> Result<Vec<DiaryEntry>> {
        let mut entries = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(entry) = self.resolve(id)? {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    /// All entries ordered by date.
    ///
    /// Descending gives newest first. Entries sharing a date keep their index
    /// order in descending mode and appear reversed in ascending mode.
    #[instrument(skip(self))]
    pub fn get_sorted(&self, descending: bool) -> Result<Vec<DiaryEntry>> {
        self.ensure_index()?;
        let mut ids = self.index.sorted_ids();
        if !descending {
            ids.reverse();
        }
        self.resolve_all(&ids)
    }

    /// One page of all entries ordered by date.
    ///
    /// Only the ids on the page are resolved. Pages in ascending order are
    /// read from the tail of the date order and then reversed, so they agree
    /// with slicing `get_sorted(false)`.
    #[instrument(skip(self))]
    pub fn get_sorted_page(
        &self,
        descending: bool,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<DiaryEntry>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        self.ensure_index()?;

        if descending {
            let ids = self.index.ids_in(offset..offset.saturating_add(limit));
            return self.resolve_all(&ids);
        }

        let end = self.index.len().saturating_sub(offset);
        let start = end.saturating_sub(limit);
        let mut ids = self.index.ids_in(start..end);
        ids.reverse();
        self.resolve_all(&ids)
    }

    /// Look up one entry. A miss is `Ok(None)`.
    pub fn get_by_id(&self, id: &EntryId) -> Result<Option<DiaryEntry>> {
        self.store.get(id)
    }

    /// Candidate ids for a filter that is not a no-op, in date order.
    ///
    /// Narrowing runs in two index stages: the date range by binary search on
    /// days, then the search text by substring. The tag criterion is left for
    /// the caller to check on resolved entries.
    fn candidates(&self, filter: &Filter) -> Vec<EntryId> {
        if let Some(range) = &filter.date_range {
            if range.is_inverted() {
                return Vec::new();
            }
        }
        let needle = filter.needle();
        self.index.candidates(
            filter.date_range.map(|r| (r.start, r.end)),
            needle.as_deref(),
        )
    }

    /// All entries matching a filter, newest first.
    #[instrument(skip(self, filter))]
    pub fn get_filtered(&self, filter: &Filter) -> Result<Vec<DiaryEntry>> {
        if filter.is_noop() {
            return self.get_sorted(true);
        }
        self.ensure_index()?;

        let candidates = self.candidates(filter);
        let mut entries = Vec::new();
        for id in &candidates {
            if let Some(entry) = self.resolve(id)? {
                if filter.matches_tags(&entry) {
                    entries.push(entry);
                }
            }
        }
        debug!(candidates = candidates.len(), matches = entries.len(), "Filter evaluated");
        Ok(entries)
    }

    /// One page of the entries matching a filter, newest first.
    ///
    /// Skips `offset` matches and returns at most `limit`. Consecutive pages
    /// concatenate to the unpaginated result.
    #[instrument(skip(self, filter))]
    pub fn get_filtered_page(
        &self,
        filter: &Filter,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<DiaryEntry>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        self.ensure_index()?;

        if filter.is_noop() {
            let end = offset.saturating_add(limit);
            let ids = self.index.ids_in(offset..end);
            return self.resolve_all(&ids);
        }

        let mut skipped = 0;
        let mut entries = Vec::with_capacity(limit);
        for id in &self.candidates(filter) {
            let Some(entry) = self.resolve(id)? else {
                continue;
            };
            if !filter.matches_tags(&entry) {
                continue;
            }
            if skipped < offset {
                skipped += 1;
                continue;
            }
            entries.push(entry);
            if entries.len() == limit {
                break;
            }
        }
        Ok(entries)
    }

    /// Every entry referencing a photo, newest first.
    ///
    /// Photo references are not indexed, so this scans the store.
    #[instrument(skip(self))]
    pub fn get_by_photo_id(&self, photo_id: &str) -> Result<Vec<DiaryEntry>> {
        let mut entries: Vec<DiaryEntry> = self
            .store
            .values()?
            .into_iter()
            .filter(|e| e.has_photo(photo_id))
            .collect();
        entries.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(entries)
    }

    /// Number of live entries
    pub fn count(&self) -> Result<usize> {
        self.store.count()
    }

    /// Distinct days in `start..=end` with at least one entry, newest first.
    pub fn days_with_entries(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<NaiveDate>> {
        self.ensure_index()?;
        Ok(self.index.days_in(start, end))
    }

    /// Tag usage across all entries, by count then name.
    ///
    /// Tags are grouped case-insensitively and reported in lowercase.
    pub fn tag_counts(&self) -> Result<Vec<(String, usize)>> {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for entry in self.store.values()? {
            let mut seen: Vec<String> = entry
                .effective_tags()
                .iter()
                .map(|t| t.to_lowercase())
                .collect();
            seen.sort();
            seen.dedup();
            for tag in seen {
                *counts.entry(tag).or_default() += 1;
            }
        }

        let mut counts: Vec<(String, usize)> = counts.into_iter().collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Ok(counts)
    }
}
