//! Application state management.

use anyhow::Context;
use photodiary_core::{
    ChangeEvent, Config, DiaryEngine, DiaryEntry, DiaryError, EntryId, FileStore, Subscription,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Shared application state.
pub struct App {
    /// Configuration
    pub config: Config,

    /// Engine over the on-disk store
    pub engine: DiaryEngine,

    /// Directory holding the store
    pub data_dir: PathBuf,

    /// Receives the change events of this process
    events: Subscription,
}

impl App {
    /// Open the store and attach it to a new engine.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let data_dir = config.data_dir()?;
        let store = open_store(&config)?;

        let engine = DiaryEngine::from_config(&config);
        engine.attach_store(Arc::new(store));
        let events = engine.subscribe();

        info!(data_dir = %data_dir.display(), "Application initialized");

        Ok(App {
            config,
            engine,
            data_dir,
            events,
        })
    }

    /// Log and return every change event published so far.
    pub fn drain_events(&self) -> Vec<ChangeEvent> {
        let events: Vec<ChangeEvent> = self.events.receiver.try_iter().collect();
        for event in &events {
            info!(
                kind = %event.kind,
                entry = %event.entry_id,
                added_photos = event.added_photo_ids.len(),
                removed_photos = event.removed_photo_ids.len(),
                "Diary changed"
            );
        }
        events
    }

    /// Fetch an entry that must exist.
    pub fn require_entry(&self, id: &EntryId) -> anyhow::Result<DiaryEntry> {
        require_entry(&self.engine, id)
    }
}

/// Open the on-disk store as configured.
///
/// A store file that cannot be read is moved aside only when
/// `recreate_on_mismatch` is set.
pub fn open_store(config: &Config) -> anyhow::Result<FileStore> {
    let data_dir = config.data_dir()?;
    let store = if config.storage.recreate_on_mismatch {
        FileStore::open_or_recreate(&data_dir)
    } else {
        FileStore::open(&data_dir)
    }
    .with_context(|| format!("Failed to open diary in {}", data_dir.display()))?;
    Ok(store.with_compression(config.storage.compress))
}

fn require_entry(engine: &DiaryEngine, id: &EntryId) -> anyhow::Result<DiaryEntry> {
    match engine.get_by_id(id)? {
        Some(entry) => Ok(entry),
        None => Err(DiaryError::NotFound { id: *id }.into()),
    }
}

/// Parse an entry id given on the command line.
pub fn parse_id(id: &str) -> anyhow::Result<EntryId> {
    id.parse()
        .with_context(|| format!("'{}' is not a valid entry id", id))
}
