//! Engine facade.
//!
//! [`DiaryEngine`] owns the index and the change notifier and, once a store is
//! attached, hands out queries and mutations over it. It is the entry point
//! most embedders need.
//!
//! Whenever an operation fails with an error that says the store must be
//! recreated, the engine drops its derived index so the next use rebuilds it
//! from whatever store is attached by then.

use crate::config::Config;
use crate::error::{DiaryError, Result};
use crate::filter::Filter;
use crate::index::DiaryIndex;
use crate::mutation::MutationCoordinator;
use crate::notify::{ChangeHandler, ChangeNotifier, SubscriberId, Subscription};
use crate::query::QueryEngine;
use crate::store::EntryStore;
use crate::types::{DiaryEntry, EntryId, NewEntry};
use chrono::NaiveDate;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
struct Attached {
    store: Arc<dyn EntryStore>,
    query: QueryEngine,
    mutations: Arc<MutationCoordinator>,
}

/// The photo diary engine.
///
/// ## Example
///
/// ```rust
/// use photodiary_core::{DiaryEngine, Filter, MemoryStore, NewEntry};
/// use chrono::NaiveDate;
/// use std::sync::Arc;
///
/// let engine = DiaryEngine::new();
/// engine.attach_store(Arc::new(MemoryStore::new()));
///
/// let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap().and_hms_opt(18, 0, 0).unwrap();
/// engine.create(NewEntry::new(date, "Beach", "Sunset over the water")).unwrap();
///
/// let found = engine.get_filtered(&Filter::new().with_search_text("sunset")).unwrap();
/// assert_eq!(found.len(), 1);
/// ```
pub struct DiaryEngine {
    index: Arc<DiaryIndex>,
    notifier: Arc<ChangeNotifier>,
    attached: RwLock<Option<Attached>>,
}

impl Default for DiaryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl DiaryEngine {
    /// Create an engine with default settings and no store.
    pub fn new() -> Self {
        Self::from_parts(DiaryIndex::new(), ChangeNotifier::new())
    }

    /// Create an engine tuned by the `[query]` and `[notify]` settings.
    pub fn from_config(config: &Config) -> Self {
        Self::from_parts(
            DiaryIndex::with_parallel_threshold(config.query.parallel_threshold),
            ChangeNotifier::with_capacity(config.notify.channel_capacity),
        )
    }

    fn from_parts(index: DiaryIndex, notifier: ChangeNotifier) -> Self {
        DiaryEngine {
            index: Arc::new(index),
            notifier: Arc::new(notifier),
            attached: RwLock::new(None),
        }
    }

    /// Attach (or replace) the entry store.
    ///
    /// Any index built over a previous store is dropped.
    pub fn attach_store(&self, store: Arc<dyn EntryStore>) {
        let attached = Attached {
            query: QueryEngine::new(store.clone(), self.index.clone()),
            mutations: Arc::new(MutationCoordinator::new(
                store.clone(),
                self.index.clone(),
                self.notifier.clone(),
            )),
            store,
        };
        let name = attached.store.name();
        let previous = self.attached.write().replace(attached);
        if previous.is_some() {
            self.index.invalidate();
        }
        info!(store = name, "Entry store attached");
    }

    /// Whether a store is attached
    pub fn is_attached(&self) -> bool {
        self.attached.read().is_some()
    }

    fn attached(&self) -> Result<Attached> {
        self.attached
            .read()
            .clone()
            .ok_or(DiaryError::NotInitialized)
    }

    /// Drop the index when the store reports it must be recreated.
    fn observe<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.requires_recreate() {
                warn!(error = %e, "Store unusable, dropping derived index");
                self.index.invalidate();
            }
        }
        result
    }

    /// Build the index now instead of on first query.
    pub fn initialize(&self) -> Result<()> {
        let attached = self.attached()?;
        self.observe(self.index.ensure_built(attached.store.as_ref()))
    }

    /// Rebuild the index from scratch.
    pub fn rebuild(&self) -> Result<()> {
        let attached = self.attached()?;
        self.observe(self.index.build(attached.store.as_ref()))
    }

    /// Check the index against the store.
    ///
    /// An unbuilt index is built first.
    pub fn verify(&self) -> Result<()> {
        let attached = self.attached()?;
        self.observe(self.index.ensure_built(attached.store.as_ref()))?;
        self.observe(self.index.verify(attached.store.as_ref()))
    }

    // === Queries ===

    pub fn get_sorted(&self, descending: bool) -> Result<Vec<DiaryEntry>> {
        let attached = self.attached()?;
        self.observe(attached.query.get_sorted(descending))
    }

    pub fn get_sorted_page(
        &self,
        descending: bool,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<DiaryEntry>> {
        let attached = self.attached()?;
        self.observe(attached.query.get_sorted_page(descending, offset, limit))
    }

    pub fn get_by_id(&self, id: &EntryId) -> Result<Option<DiaryEntry>> {
        let attached = self.attached()?;
        self.observe(attached.query.get_by_id(id))
    }

    pub fn get_filtered(&self, filter: &Filter) -> Result<Vec<DiaryEntry>> {
        let attached = self.attached()?;
        self.observe(attached.query.get_filtered(filter))
    }

    pub fn get_filtered_page(
        &self,
        filter: &Filter,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<DiaryEntry>> {
        let attached = self.attached()?;
        self.observe(attached.query.get_filtered_page(filter, offset, limit))
    }

    pub fn get_by_photo_id(&self, photo_id: &str) -> Result<Vec<DiaryEntry>> {
        let attached = self.attached()?;
        self.observe(attached.query.get_by_photo_id(photo_id))
    }

    pub fn count(&self) -> Result<usize> {
        let attached = self.attached()?;
        self.observe(attached.query.count())
    }

    pub fn days_with_entries(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<NaiveDate>> {
        let attached = self.attached()?;
        self.observe(attached.query.days_with_entries(start, end))
    }

    pub fn tag_counts(&self) -> Result<Vec<(String, usize)>> {
        let attached = self.attached()?;
        self.observe(attached.query.tag_counts())
    }

    // === Mutations ===

    pub fn create(&self, new: NewEntry) -> Result<DiaryEntry> {
        let attached = self.attached()?;
        self.observe(attached.mutations.create(new))
    }

    pub fn update(&self, entry: DiaryEntry) -> Result<DiaryEntry> {
        let attached = self.attached()?;
        self.observe(attached.mutations.update(entry))
    }

    /// Delete an entry. Deleting an unknown id is `Ok(None)`.
    pub fn delete(&self, id: &EntryId) -> Result<Option<DiaryEntry>> {
        let attached = self.attached()?;
        self.observe(attached.mutations.delete(id))
    }

    // === Notifications ===

    pub fn subscribe(&self) -> Subscription {
        self.notifier.subscribe()
    }

    pub fn subscribe_with(&self, handler: Arc<dyn ChangeHandler>) -> SubscriberId {
        self.notifier.subscribe_with(handler)
    }

    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.notifier.unsubscribe(id)
    }

    /// Close the notifier. Queued events can still be drained.
    pub fn close(&self) {
        self.notifier.close();
    }

    /// The shared index
    pub fn index(&self) -> &Arc<DiaryIndex> {
        &self.index
    }
}

impl std::fmt::Debug for DiaryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiaryEngine")
            .field("attached", &self.is_attached())
            .field("index", &self.index)
            .field("notifier", &self.notifier)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{ChangeEvent, ChangeKind};
    use crate::store::MemoryStore;
    use crate::types::test_support::*;
    use chrono::NaiveDateTime;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Duration;

    /// A store whose first full read is slow
    struct SlowStore {
        inner: MemoryStore,
        slowed: AtomicBool,
    }

    impl EntryStore for SlowStore {
        fn get(&self, id: &EntryId) -> Result<Option<DiaryEntry>> {
            self.inner.get(id)
        }
        fn put(&self, id: &EntryId, entry: &DiaryEntry) -> Result<()> {
            self.inner.put(id, entry)
        }
        fn delete(&self, id: &EntryId) -> Result<()> {
            self.inner.delete(id)
        }
        fn values(&self) -> Result<Vec<DiaryEntry>> {
            let values = self.inner.values()?;
            if !self.slowed.swap(true, Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(300));
            }
            Ok(values)
        }
        fn count(&self) -> Result<usize> {
            self.inner.count()
        }
        fn name(&self) -> &'static str {
            "slow"
        }
    }

    fn engine() -> (DiaryEngine, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let engine = DiaryEngine::new();
        engine.attach_store(store.clone());
        (engine, store)
    }

    fn add(engine: &DiaryEngine, date: NaiveDateTime, title: &str) -> DiaryEntry {
        engine.create(NewEntry::new(date, title, "")).unwrap()
    }

    fn dates(entries: &[DiaryEntry]) -> Vec<NaiveDateTime> {
        entries.iter().map(|e| e.date).collect()
    }

    #[test]
    fn test_not_initialized() {
        let engine = DiaryEngine::new();
        assert!(matches!(engine.get_sorted(true), Err(DiaryError::NotInitialized)));
        assert!(matches!(
            engine.create(NewEntry::new(at(2024, 1, 1), "x", "")),
            Err(DiaryError::NotInitialized)
        ));
        assert!(matches!(engine.initialize(), Err(DiaryError::NotInitialized)));
    }

    #[test]
    fn test_scenario_empty_store_then_insert() {
        let (engine, _) = engine();
        engine.initialize().unwrap();
        assert!(engine.get_sorted(true).unwrap().is_empty());

        let entry = add(&engine, at(2024, 3, 1), "march");
        assert_eq!(engine.get_sorted(true).unwrap(), vec![entry]);
    }

    #[test]
    fn test_scenario_insert_order_independent() {
        let (engine, _) = engine();
        add(&engine, at(2024, 1, 10), "a");
        add(&engine, at(2024, 1, 5), "b");
        add(&engine, at(2024, 1, 20), "c");

        assert_eq!(
            dates(&engine.get_sorted(true).unwrap()),
            vec![at(2024, 1, 20), at(2024, 1, 10), at(2024, 1, 5)]
        );
        engine.verify().unwrap();
    }

    #[test]
    fn test_scenario_single_day_range() {
        let (engine, _) = engine();
        add(&engine, at_hour(2024, 1, 1, 8), "d1 a");
        add(&engine, at_hour(2024, 1, 2, 8), "d2 a");
        add(&engine, at_hour(2024, 1, 2, 20), "d2 b");
        add(&engine, at_hour(2024, 1, 3, 8), "d3 a");
        add(&engine, at_hour(2024, 1, 3, 9), "d3 b");

        let range = engine
            .index()
            .find_range_by_date_range(day(2024, 1, 2), day(2024, 1, 2));
        assert_eq!(range, 2..4);

        let found = engine
            .get_filtered(&Filter::new().with_date_range(day(2024, 1, 2), day(2024, 1, 2)))
            .unwrap();
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|e| e.day() == day(2024, 1, 2)));
    }

    #[test]
    fn test_scenario_date_change_moves_between_months() {
        let (engine, _) = engine();
        add(&engine, at(2024, 1, 3), "other");
        let mut entry = add(&engine, at(2024, 1, 10), "moving");

        let january = Filter::new().with_date_range(day(2024, 1, 1), day(2024, 1, 31));
        let february = Filter::new().with_date_range(day(2024, 2, 1), day(2024, 2, 29));
        assert_eq!(engine.get_filtered(&january).unwrap().len(), 2);

        entry.date = at(2024, 2, 1);
        engine.update(entry.clone()).unwrap();

        let jan = engine.get_filtered(&january).unwrap();
        assert_eq!(jan.len(), 1);
        assert!(jan.iter().all(|e| e.id != entry.id));

        let feb = engine.get_filtered(&february).unwrap();
        assert_eq!(feb.len(), 1);
        assert_eq!(feb[0].id, entry.id);
        engine.verify().unwrap();
    }

    #[test]
    fn test_scenario_delete_unknown_id() {
        let (engine, _) = engine();
        add(&engine, at(2024, 1, 1), "kept");
        let sub = engine.subscribe();

        assert!(engine.delete(&EntryId::new()).unwrap().is_none());
        assert!(sub.receiver.try_recv().is_err());
        assert_eq!(engine.count().unwrap(), 1);
    }

    #[test]
    fn test_scenario_text_pages() {
        let (engine, _) = engine();
        for (d, title) in [
            (2, "sunset one"),
            (4, "morning"),
            (6, "Sunset two"),
            (8, "rain"),
            (10, "SUNSET three"),
        ] {
            add(&engine, at(2024, 1, d), title);
        }

        let filter = Filter::new().with_search_text("sunset");
        let first = engine.get_filtered_page(&filter, 0, 2).unwrap();
        let second = engine.get_filtered_page(&filter, 2, 2).unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 1);

        let all: Vec<DiaryEntry> = first.into_iter().chain(second).collect();
        assert_eq!(
            dates(&all),
            vec![at(2024, 1, 10), at(2024, 1, 6), at(2024, 1, 2)]
        );
    }

    #[test]
    fn test_create_then_get_round_trip() {
        let (engine, _) = engine();
        let entry = engine
            .create(
                NewEntry::new(at(2024, 5, 5), "title", "content")
                    .with_photos(["p1"])
                    .with_location("Porto")
                    .with_tags(["a"]),
            )
            .unwrap();

        let fetched = engine.get_by_id(&entry.id).unwrap().unwrap();
        assert_eq!(fetched.title, "title");
        assert_eq!(fetched.content, "content");
        assert_eq!(fetched.photo_ids, vec!["p1".to_string()]);
        assert_eq!(fetched.location.as_deref(), Some("Porto"));
        assert_eq!(fetched.tags, Some(vec!["a".to_string()]));
    }

    #[test]
    fn test_invariants_hold_across_mutations() {
        let (engine, _) = engine();
        let mut created = Vec::new();
        for d in [5, 1, 9, 3, 9, 7] {
            created.push(add(&engine, at(2024, 4, d), "x"));
            engine.verify().unwrap();
        }

        let mut moved = created[0].clone();
        moved.date = at(2023, 12, 25);
        moved.content = "christmas".to_string();
        engine.update(moved).unwrap();
        engine.verify().unwrap();

        engine.delete(&created[2].id).unwrap();
        engine.verify().unwrap();
        assert_eq!(engine.get_sorted(true).unwrap().len(), 5);
        assert_eq!(
            engine
                .get_filtered(&Filter::new().with_search_text("CHRISTMAS"))
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn test_events_per_mutation() {
        let (engine, _) = engine();
        let sub = engine.subscribe();

        let mut entry = engine
            .create(NewEntry::new(at(2024, 1, 1), "x", "").with_photos(["p1"]))
            .unwrap();
        entry.photo_ids = vec!["p2".to_string()];
        engine.update(entry.clone()).unwrap();
        engine.delete(&entry.id).unwrap();

        let events: Vec<ChangeEvent> = sub.receiver.try_iter().collect();
        let kinds: Vec<ChangeKind> = events.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![ChangeKind::Created, ChangeKind::Updated, ChangeKind::Deleted]
        );
        assert_eq!(events[1].added_photo_ids, vec!["p2".to_string()]);
        assert_eq!(events[1].removed_photo_ids, vec!["p1".to_string()]);
        assert_eq!(events[2].removed_photo_ids, vec!["p2".to_string()]);
    }

    #[test]
    fn test_lazy_build_does_not_lose_concurrent_create() {
        let store = Arc::new(SlowStore {
            inner: MemoryStore::new(),
            slowed: AtomicBool::new(false),
        });
        let engine = DiaryEngine::new();
        engine.attach_store(store.clone());

        let created = thread::scope(|scope| {
            let reader = scope.spawn(|| engine.get_sorted(true).unwrap());
            thread::sleep(Duration::from_millis(50));
            let created = add(&engine, at(2024, 1, 1), "during build");
            reader.join().unwrap();
            created
        });

        assert_eq!(engine.index().len(), store.count().unwrap());
        engine.verify().unwrap();
        assert_eq!(engine.get_sorted(true).unwrap(), vec![created]);
    }

    #[test]
    fn test_sorted_page_through_engine() {
        let (engine, _) = engine();
        for d in [3, 1, 2] {
            add(&engine, at(2024, 1, d), "x");
        }
        assert_eq!(
            dates(&engine.get_sorted_page(false, 1, 5).unwrap()),
            vec![at(2024, 1, 2), at(2024, 1, 3)]
        );
        assert!(matches!(
            DiaryEngine::new().get_sorted_page(true, 0, 1),
            Err(DiaryError::NotInitialized)
        ));
    }

    #[test]
    fn test_verify_detects_out_of_band_write() {
        let (engine, store) = engine();
        add(&engine, at(2024, 1, 1), "x");

        let stray = make_entry(at(2024, 1, 2), "stray");
        store.put(&stray.id, &stray).unwrap();

        assert!(matches!(
            engine.verify(),
            Err(DiaryError::IndexInconsistency { .. })
        ));
        engine.rebuild().unwrap();
        engine.verify().unwrap();
    }

    #[test]
    fn test_attach_new_store_drops_index() {
        let (engine, _) = engine();
        add(&engine, at(2024, 1, 1), "x");
        assert!(engine.index().is_built());

        engine.attach_store(Arc::new(MemoryStore::new()));
        assert!(!engine.index().is_built());
        assert!(engine.get_sorted(true).unwrap().is_empty());
    }

    #[test]
    fn test_unusable_store_invalidates_index() {
        struct BrokenStore;
        impl EntryStore for BrokenStore {
            fn get(&self, _id: &EntryId) -> Result<Option<DiaryEntry>> {
                Err(DiaryError::StoreUnusable {
                    reason: "schema".to_string(),
                })
            }
            fn put(&self, _id: &EntryId, _entry: &DiaryEntry) -> Result<()> {
                Ok(())
            }
            fn delete(&self, _id: &EntryId) -> Result<()> {
                Ok(())
            }
            fn values(&self) -> Result<Vec<DiaryEntry>> {
                Ok(Vec::new())
            }
            fn count(&self) -> Result<usize> {
                Ok(0)
            }
            fn name(&self) -> &'static str {
                "broken"
            }
        }

        let engine = DiaryEngine::new();
        engine.attach_store(Arc::new(BrokenStore));
        engine.initialize().unwrap();
        assert!(engine.index().is_built());

        let err = engine.get_by_id(&EntryId::new()).unwrap_err();
        assert!(err.requires_recreate());
        assert!(!engine.index().is_built());
    }

    #[test]
    fn test_from_config() {
        let mut config = Config::default();
        config.notify.channel_capacity = 1;
        let engine = DiaryEngine::from_config(&config);
        engine.attach_store(Arc::new(MemoryStore::new()));

        let sub = engine.subscribe();
        add(&engine, at(2024, 1, 1), "a");
        add(&engine, at(2024, 1, 2), "b");
        assert_eq!(sub.receiver.try_iter().count(), 1);
    }
}
