//! In-memory date index over the entry store.
//!
//! The `DiaryIndex` holds the derived structures that make ordered, ranged and
//! text queries cheap. It supports:
//!
//! - Full builds from the entry store
//! - Incremental maintenance on create, update and delete
//! - Date range lookups by binary search
//! - Candidate narrowing by substring search
//!
//! ## Architecture
//!
//! Three aligned structures are kept behind a single lock:
//! - `ids`: entry ids ordered by date, newest first
//! - `days`: the day-truncated date of `ids[i]`, used for range searches
//! - `search_text`: id -> lowercase searchable text
//!
//! A private `dates` vector carries the full date of `ids[i]` so insertion can
//! binary search on the exact sort key without touching the store.
//!
//! Inserts and removals splice the vectors (O(n)), which is fine for a personal
//! diary. Every splice happens under the write lock, so readers observe either
//! the state before or after a mutation, never a partial one.
//!
//! Builds read the whole store before taking the state lock. A separate writer
//! lock, exposed through [`DiaryIndex::write_lock`], is held across that read so
//! a mutation cannot commit between the snapshot and its publication.

use crate::error::{DiaryError, Result};
use crate::store::EntryStore;
use crate::types::{day_of, DiaryEntry, EntryId};
use chrono::{NaiveDate, NaiveDateTime};
use parking_lot::{ReentrantMutex, ReentrantMutexGuard, RwLock};
use rayon::prelude::*;
use std::collections::HashMap;
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, instrument, warn};

/// Entry count above which builds sort and lowercase in parallel
pub const DEFAULT_PARALLEL_THRESHOLD: usize = 10_000;

#[derive(Debug, Default)]
struct IndexState {
    /// Whether a build has completed since creation or the last invalidation
    built: bool,

    /// Entry ids, non-increasing by date
    ids: Vec<EntryId>,

    /// Full date of `ids[i]`
    dates: Vec<NaiveDateTime>,

    /// Day of `ids[i]`
    days: Vec<NaiveDate>,

    /// Lowercase searchable text per id
    search_text: HashMap<EntryId, String>,
}

impl IndexState {
    fn position(&self, id: &EntryId) -> Option<usize> {
        self.ids.iter().position(|x| x == id)
    }

    fn insert(&mut self, entry: &DiaryEntry) -> usize {
        // New entries go left of existing entries with the same date
        let pos = self.dates.partition_point(|d| *d > entry.date);
        self.ids.insert(pos, entry.id);
        self.dates.insert(pos, entry.date);
        self.days.insert(pos, entry.day());
        self.search_text.insert(entry.id, entry.searchable_text());
        pos
    }

    fn remove_at(&mut self, pos: usize) -> EntryId {
        let id = self.ids.remove(pos);
        self.dates.remove(pos);
        self.days.remove(pos);
        self.search_text.remove(&id);
        id
    }

    fn clear(&mut self) {
        self.ids.clear();
        self.dates.clear();
        self.days.clear();
        self.search_text.clear();
    }
}

/// The derived index over all diary entries.
///
/// This structure is designed for concurrent access:
/// - Multiple readers can query simultaneously
/// - Mutations are serialized via internal locking
/// - Builds and store mutations are serialized through [`DiaryIndex::write_lock`]
///
/// ## Example
///
/// ```rust
/// use photodiary_core::{DiaryIndex, MemoryStore};
///
/// let store = MemoryStore::new();
/// let index = DiaryIndex::new();
/// index.ensure_built(&store).unwrap();
/// assert!(index.is_empty());
/// ```
pub struct DiaryIndex {
    state: RwLock<IndexState>,

    /// Entry count above which builds use rayon
    parallel_threshold: usize,

    /// Generation counter, bumped on every change
    generation: AtomicU64,

    /// Held by builds and by store mutations that maintain the index
    writer: ReentrantMutex<()>,
}

impl Default for DiaryIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl DiaryIndex {
    /// Create a new, unbuilt index.
    pub fn new() -> Self {
        Self::with_parallel_threshold(DEFAULT_PARALLEL_THRESHOLD)
    }

    /// Create an unbuilt index with a custom parallel build threshold.
    pub fn with_parallel_threshold(parallel_threshold: usize) -> Self {
        DiaryIndex {
            state: RwLock::new(IndexState::default()),
            parallel_threshold,
            generation: AtomicU64::new(0),
            writer: ReentrantMutex::new(()),
        }
    }

    /// Whether the index has been built.
    pub fn is_built(&self) -> bool {
        self.state.read().built
    }

    /// Number of indexed entries.
    pub fn len(&self) -> usize {
        self.state.read().ids.len()
    }

    /// Check if the index holds no entries.
    pub fn is_empty(&self) -> bool {
        self.state.read().ids.is_empty()
    }

    /// Get the current generation (modification counter).
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    fn bump(&self) {
        self.generation.fetch_add(1, Ordering::Release);
    }

    /// Acquire the writer lock.
    ///
    /// Hold it across a store write and the matching index update. Builds take
    /// the same lock, so a build never publishes a store snapshot that misses a
    /// committed write. The lock is reentrant: a holder may call `build` or
    /// `ensure_built` itself.
    pub fn write_lock(&self) -> ReentrantMutexGuard<'_, ()> {
        self.writer.lock()
    }

    /// Rebuild from every entry in the store.
    ///
    /// Clears any previous state first, so calling it twice yields the same
    /// index. An empty store yields an empty, built index.
    #[instrument(skip(self, store), fields(store = store.name()))]
    pub fn build(&self, store: &dyn EntryStore) -> Result<()> {
        let _writer = self.writer.lock();
        let entries = store.values()?;
        self.build_from(entries);
        Ok(())
    }

    /// Rebuild from an explicit set of entries.
    pub fn build_from(&self, mut entries: Vec<DiaryEntry>) {
        let count = entries.len();
        let parallel = count > self.parallel_threshold;

        // Stable sort, newest first
        if parallel {
            entries.par_sort_by(|a, b| b.date.cmp(&a.date));
        } else {
            entries.sort_by(|a, b| b.date.cmp(&a.date));
        }

        let texts: Vec<String> = if parallel {
            entries.par_iter().map(DiaryEntry::searchable_text).collect()
        } else {
            entries.iter().map(DiaryEntry::searchable_text).collect()
        };

        let mut state = self.state.write();
        state.clear();
        state.ids.reserve(count);
        state.dates.reserve(count);
        state.days.reserve(count);
        state.search_text.reserve(count);
        for (entry, text) in entries.iter().zip(texts) {
            state.ids.push(entry.id);
            state.dates.push(entry.date);
            state.days.push(entry.day());
            state.search_text.insert(entry.id, text);
        }
        state.built = true;
        drop(state);

        self.bump();
        info!(entries = count, parallel, "Diary index built");
    }

    /// Build the index unless it is already built.
    ///
    /// Concurrent callers build once: the rest wait on the writer lock and find
    /// the index built.
    pub fn ensure_built(&self, store: &dyn EntryStore) -> Result<()> {
        if self.is_built() {
            return Ok(());
        }
        let _writer = self.writer.lock();
        if self.is_built() {
            return Ok(());
        }
        self.build(store)
    }

    /// Drop all derived state so the next `ensure_built` rebuilds.
    pub fn invalidate(&self) {
        let mut state = self.state.write();
        state.clear();
        state.built = false;
        drop(state);
        self.bump();
        debug!("Diary index invalidated");
    }

    /// Insert an entry at its sorted position.
    ///
    /// If the id is already indexed its old position is dropped first, so
    /// inserting twice never duplicates an id.
    #[instrument(skip(self, entry), fields(id = %entry.id))]
    pub fn insert_entry(&self, entry: &DiaryEntry) {
        let mut state = self.state.write();
        if let Some(old) = state.position(&entry.id) {
            state.remove_at(old);
        }
        let pos = state.insert(entry);
        drop(state);
        self.bump();
        debug!(position = pos, date = %entry.date, "Entry indexed");
    }

    /// Remove an entry from all structures.
    ///
    /// Returns false if the id was not indexed.
    #[instrument(skip(self))]
    pub fn remove_entry(&self, id: &EntryId) -> bool {
        let mut state = self.state.write();
        // TODO: keep an id -> position map if diaries grow past a few thousand entries
        let Some(pos) = state.position(id) else {
            return false;
        };
        state.remove_at(pos);
        drop(state);
        self.bump();
        debug!(position = pos, "Entry removed from index");
        true
    }

    /// Move an entry to the position its current date requires.
    ///
    /// Does nothing if the date is unchanged. An entry that is not indexed yet
    /// is inserted.
    #[instrument(skip(self, entry), fields(id = %entry.id))]
    pub fn update_entry_date(&self, entry: &DiaryEntry) {
        let mut state = self.state.write();
        match state.position(&entry.id) {
            Some(pos) if state.dates[pos] == entry.date => return,
            Some(pos) => {
                state.remove_at(pos);
                state.insert(entry);
            }
            None => {
                state.insert(entry);
            }
        }
        drop(state);
        self.bump();
    }

    /// Recompute the searchable text of an entry.
    pub fn update_entry_search_text(&self, entry: &DiaryEntry) {
        self.state
            .write()
            .search_text
            .insert(entry.id, entry.searchable_text());
        self.bump();
    }

    /// Positions whose day lies in `start_day..=end_day`.
    ///
    /// Returns a half-open range into the date order. An inverted range or an
    /// empty index gives `0..0`.
    pub fn find_range_by_date_range(&self, start_day: NaiveDate, end_day: NaiveDate) -> Range<usize> {
        let state = self.state.read();
        range_in(&state.days, start_day, end_day)
    }

    /// All ids in date order, newest first.
    pub fn sorted_ids(&self) -> Vec<EntryId> {
        self.state.read().ids.clone()
    }

    /// Ids at the positions `range`, clamped to the index length.
    pub fn ids_in(&self, range: Range<usize>) -> Vec<EntryId> {
        let state = self.state.read();
        let end = range.end.min(state.ids.len());
        let start = range.start.min(end);
        state.ids[start..end].to_vec()
    }

    /// Ids narrowed by an optional day range and an optional lowercase needle.
    ///
    /// The day range is resolved by binary search; the needle is matched by
    /// substring containment against the stored searchable text. Date order is
    /// preserved.
    pub fn candidates(
        &self,
        day_range: Option<(NaiveDate, NaiveDate)>,
        needle: Option<&str>,
    ) -> Vec<EntryId> {
        let state = self.state.read();
        let range = match day_range {
            Some((start, end)) => range_in(&state.days, start, end),
            None => 0..state.ids.len(),
        };
        let ids = &state.ids[range];

        match needle {
            Some(needle) => ids
                .iter()
                .filter(|id| match state.search_text.get(*id) {
                    Some(text) => text.contains(needle),
                    None => {
                        warn!(id = %id, "Indexed entry has no search text");
                        false
                    }
                })
                .copied()
                .collect(),
            None => ids.to_vec(),
        }
    }

    /// Distinct days within `start_day..=end_day`, newest first.
    pub fn days_in(&self, start_day: NaiveDate, end_day: NaiveDate) -> Vec<NaiveDate> {
        let state = self.state.read();
        let range = range_in(&state.days, start_day, end_day);
        let mut days: Vec<NaiveDate> = state.days[range].to_vec();
        days.dedup();
        days
    }

    /// Searchable text of an indexed entry.
    pub fn search_text(&self, id: &EntryId) -> Option<String> {
        self.state.read().search_text.get(id).cloned()
    }

    /// Check the index against the store.
    ///
    /// Verifies the length, the date order, the day alignment and the search
    /// text of every entry. Returns the first violation found.
    pub fn verify(&self, store: &dyn EntryStore) -> Result<()> {
        let state = self.state.read();
        let inconsistent = |reason: String| Err(DiaryError::IndexInconsistency { reason });

        let count = store.count()?;
        if state.ids.len() != count {
            return inconsistent(format!(
                "index has {} entries, store has {}",
                state.ids.len(),
                count
            ));
        }
        if state.search_text.len() != count {
            return inconsistent(format!(
                "search index has {} entries, store has {}",
                state.search_text.len(),
                count
            ));
        }

        for (pos, id) in state.ids.iter().enumerate() {
            let Some(entry) = store.get(id)? else {
                return inconsistent(format!("indexed id {} missing from store", id));
            };
            if pos > 0 && state.dates[pos - 1] < entry.date {
                return inconsistent(format!("date order broken at position {}", pos));
            }
            if state.dates[pos] != entry.date || state.days[pos] != day_of(entry.date) {
                return inconsistent(format!("date of {} is stale at position {}", id, pos));
            }
            if state.search_text.get(id) != Some(&entry.searchable_text()) {
                return inconsistent(format!("search text of {} is stale", id));
            }
        }
        Ok(())
    }
}

/// Half-open range of a non-increasing `days` slice covering `start..=end`.
fn range_in(days: &[NaiveDate], start_day: NaiveDate, end_day: NaiveDate) -> Range<usize> {
    if start_day > end_day || days.is_empty() {
        return 0..0;
    }
    // Leftmost position with day <= end
    let first = days.partition_point(|d| *d > end_day);
    // Leftmost position after `first` with day < start
    let last = first + days[first..].partition_point(|d| *d >= start_day);
    first..last
}

impl std::fmt::Debug for DiaryIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiaryIndex")
            .field("built", &self.is_built())
            .field("entry_count", &self.len())
            .field("generation", &self.generation())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::test_support::*;

    fn dates_of(index: &DiaryIndex, store: &MemoryStore) -> Vec<NaiveDateTime> {
        index
            .sorted_ids()
            .iter()
            .map(|id| store.get(id).unwrap().unwrap().date)
            .collect()
    }

    fn populated() -> (DiaryIndex, MemoryStore) {
        let store = MemoryStore::with_entries(vec![
            make_entry(at(2024, 1, 10), "ten"),
            make_entry(at_hour(2024, 1, 12, 9), "twelve morning"),
            make_entry(at_hour(2024, 1, 12, 18), "twelve evening"),
            make_entry(at(2024, 1, 15), "fifteen"),
            make_entry(at(2024, 1, 5), "five"),
        ]);
        let index = DiaryIndex::new();
        index.build(&store).unwrap();
        (index, store)
    }

    #[test]
    fn test_build_while_holding_writer_lock() {
        let store = MemoryStore::with_entries(vec![make_entry(at(2024, 1, 1), "one")]);
        let index = DiaryIndex::new();

        let _writer = index.write_lock();
        index.ensure_built(&store).unwrap();
        index.build(&store).unwrap();
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_build_empty_store() {
        let store = MemoryStore::new();
        let index = DiaryIndex::new();
        assert!(!index.is_built());

        index.build(&store).unwrap();
        assert!(index.is_built());
        assert!(index.is_empty());
        assert_eq!(index.find_range_by_date_range(day(2024, 1, 1), day(2024, 12, 31)), 0..0);
    }

    #[test]
    fn test_build_sorts_descending() {
        let (index, store) = populated();
        let dates = dates_of(&index, &store);
        assert_eq!(dates.len(), 5);
        assert!(dates.windows(2).all(|w| w[0] >= w[1]));
        index.verify(&store).unwrap();
    }

    #[test]
    fn test_build_is_idempotent() {
        let (index, store) = populated();
        let first = index.sorted_ids();
        index.build(&store).unwrap();
        assert_eq!(index.sorted_ids(), first);
        assert_eq!(index.len(), 5);
    }

    #[test]
    fn test_build_parallel_matches_sequential() {
        let entries: Vec<DiaryEntry> = (1..=28)
            .map(|d| make_entry(at(2024, 2, d), "p"))
            .collect();
        let store = MemoryStore::with_entries(entries);

        let sequential = DiaryIndex::new();
        sequential.build(&store).unwrap();
        let parallel = DiaryIndex::with_parallel_threshold(4);
        parallel.build(&store).unwrap();

        assert_eq!(dates_of(&sequential, &store), dates_of(&parallel, &store));
        parallel.verify(&store).unwrap();
    }

    #[test]
    fn test_insert_keeps_order() {
        let store = MemoryStore::new();
        let index = DiaryIndex::new();
        index.build(&store).unwrap();

        for d in [10, 5, 20] {
            let entry = make_entry(at(2024, 1, d), "x");
            store.put(&entry.id, &entry).unwrap();
            index.insert_entry(&entry);
        }

        assert_eq!(
            dates_of(&index, &store),
            vec![at(2024, 1, 20), at(2024, 1, 10), at(2024, 1, 5)]
        );
        index.verify(&store).unwrap();
    }

    #[test]
    fn test_insert_goes_left_of_equal_dates() {
        let (index, store) = populated();
        let twin = make_entry(at(2024, 1, 10), "twin");
        store.put(&twin.id, &twin).unwrap();
        index.insert_entry(&twin);

        let ids = index.sorted_ids();
        let pos = ids.iter().position(|id| *id == twin.id).unwrap();
        let next = store.get(&ids[pos + 1]).unwrap().unwrap();
        assert_eq!(next.date, at(2024, 1, 10));
        assert_eq!(next.title, "ten");
    }

    #[test]
    fn test_insert_twice_does_not_duplicate() {
        let (index, store) = populated();
        let entry = make_entry(at(2024, 1, 11), "again");
        store.put(&entry.id, &entry).unwrap();
        index.insert_entry(&entry);
        index.insert_entry(&entry);
        assert_eq!(index.len(), 6);
        index.verify(&store).unwrap();
    }

    #[test]
    fn test_remove_entry() {
        let (index, store) = populated();
        let victim = index.sorted_ids()[2];

        assert!(index.remove_entry(&victim));
        store.delete(&victim).unwrap();

        assert_eq!(index.len(), 4);
        assert!(index.search_text(&victim).is_none());
        assert!(!index.remove_entry(&victim));
        index.verify(&store).unwrap();
    }

    #[test]
    fn test_update_entry_date_moves_entry() {
        let (index, store) = populated();
        let id = index.sorted_ids()[0];
        let mut entry = store.get(&id).unwrap().unwrap();
        entry.date = at(2023, 12, 31);
        store.put(&id, &entry).unwrap();

        index.update_entry_date(&entry);

        assert_eq!(*index.sorted_ids().last().unwrap(), id);
        index.verify(&store).unwrap();
    }

    #[test]
    fn test_update_entry_date_unchanged_is_noop() {
        let (index, store) = populated();
        let ids = index.sorted_ids();
        let generation = index.generation();

        let entry = store.get(&ids[1]).unwrap().unwrap();
        index.update_entry_date(&entry);

        assert_eq!(index.sorted_ids(), ids);
        assert_eq!(index.generation(), generation);
    }

    #[test]
    fn test_update_search_text() {
        let (index, store) = populated();
        let id = index.sorted_ids()[0];
        let mut entry = store.get(&id).unwrap().unwrap();
        entry.content = "Golden SUNSET".to_string();
        store.put(&id, &entry).unwrap();

        index.update_entry_search_text(&entry);

        assert!(index.search_text(&id).unwrap().contains("golden sunset"));
        index.verify(&store).unwrap();
    }

    #[test]
    fn test_range_single_day() {
        let (index, store) = populated();
        let range = index.find_range_by_date_range(day(2024, 1, 12), day(2024, 1, 12));
        assert_eq!(range.len(), 2);

        let ids = index.ids_in(range);
        for id in ids {
            assert_eq!(store.get(&id).unwrap().unwrap().day(), day(2024, 1, 12));
        }
    }

    #[test]
    fn test_range_no_match_and_all_match() {
        let (index, _) = populated();
        assert!(index
            .find_range_by_date_range(day(2024, 1, 11), day(2024, 1, 11))
            .is_empty());
        assert!(index
            .find_range_by_date_range(day(2030, 1, 1), day(2030, 1, 1))
            .is_empty());
        assert_eq!(
            index.find_range_by_date_range(day(2024, 1, 1), day(2024, 1, 31)),
            0..5
        );
    }

    #[test]
    fn test_range_inclusive_bounds() {
        let (index, _) = populated();
        // 15, 12, 12, 10 are inside; 5 is not
        assert_eq!(
            index.find_range_by_date_range(day(2024, 1, 10), day(2024, 1, 15)),
            0..4
        );
    }

    #[test]
    fn test_range_inverted_is_empty() {
        let (index, _) = populated();
        assert_eq!(
            index.find_range_by_date_range(day(2024, 1, 15), day(2024, 1, 5)),
            0..0
        );
    }

    #[test]
    fn test_candidates_by_text_and_range() {
        let (index, _) = populated();
        assert_eq!(index.candidates(None, Some("twelve")).len(), 2);
        assert_eq!(index.candidates(None, Some("evening")).len(), 1);
        assert_eq!(
            index
                .candidates(Some((day(2024, 1, 1), day(2024, 1, 11))), None)
                .len(),
            2
        );
        assert!(index
            .candidates(Some((day(2024, 1, 1), day(2024, 1, 11))), Some("twelve"))
            .is_empty());
    }

    #[test]
    fn test_days_in() {
        let (index, _) = populated();
        assert_eq!(
            index.days_in(day(2024, 1, 1), day(2024, 1, 31)),
            vec![
                day(2024, 1, 15),
                day(2024, 1, 12),
                day(2024, 1, 10),
                day(2024, 1, 5)
            ]
        );
    }

    #[test]
    fn test_ids_in_clamps() {
        let (index, _) = populated();
        assert_eq!(index.ids_in(3..100).len(), 2);
        assert!(index.ids_in(10..20).is_empty());
    }

    #[test]
    fn test_verify_detects_stale_entry() {
        let (index, store) = populated();
        let id = index.sorted_ids()[0];
        store.delete(&id).unwrap();

        let err = index.verify(&store).unwrap_err();
        assert!(matches!(err, DiaryError::IndexInconsistency { .. }));
    }

    #[test]
    fn test_invalidate_forces_rebuild() {
        let (index, store) = populated();
        index.invalidate();
        assert!(!index.is_built());
        assert!(index.is_empty());

        index.ensure_built(&store).unwrap();
        assert_eq!(index.len(), 5);
    }

    #[test]
    fn test_generation() {
        let index = DiaryIndex::new();
        let gen1 = index.generation();
        index.build(&MemoryStore::new()).unwrap();
        assert!(index.generation() > gen1);
    }
}
