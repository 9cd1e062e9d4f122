//! # Photodiary Core Library
//!
//! This crate provides the indexing, query and mutation engine behind a photo
//! diary: dated entries with text, tags, a location and references into an
//! external photo library. It is storage-agnostic, with the persisted entry
//! map abstracted behind a trait.
//!
//! ## Architecture
//!
//! - **Types** (`types`): Diary entries and their identifiers
//! - **Store** (`store`, `persistence`): The entry store contract, an
//!   in-memory store and a single-file persisted store
//! - **Index** (`index`): Date-ordered, day and text indexes kept in memory
//! - **Filter** (`filter`): Query predicates and their textual syntax
//! - **Query** (`query`): Sorted, filtered and paginated reads
//! - **Mutation** (`mutation`): Create, update and delete with index upkeep
//! - **Notify** (`notify`): Change events for subscribers
//! - **Engine** (`engine`): Facade wiring all of the above
//! - **Config** (`config`): Configuration management
//!
//! ## Example
//!
//! ```rust
//! use photodiary_core::{DiaryEngine, Filter, MemoryStore, NewEntry};
//! use chrono::NaiveDate;
//! use std::sync::Arc;
//!
//! let engine = DiaryEngine::new();
//! engine.attach_store(Arc::new(MemoryStore::new()));
//!
//! let day = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
//! engine
//!     .create(NewEntry::new(day.and_hms_opt(9, 0, 0).unwrap(), "Hike", "Foggy ridge"))
//!     .unwrap();
//!
//! let page = engine
//!     .get_filtered_page(&Filter::new().with_date_range(day, day), 0, 20)
//!     .unwrap();
//! for entry in page {
//!     println!("{} {}", entry.date, entry.title);
//! }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod filter;
pub mod index;
pub mod mutation;
pub mod notify;
pub mod persistence;
pub mod query;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use engine::DiaryEngine;
pub use error::{DiaryError, Result};
pub use filter::{parse_date_time, parse_filter, DateRange, Filter};
pub use index::DiaryIndex;
pub use mutation::{MutationCoordinator, PhotoDiff};
pub use notify::{ChangeEvent, ChangeHandler, ChangeKind, ChangeNotifier, SubscriberId, Subscription};
pub use persistence::FileStore;
pub use query::QueryEngine;
pub use store::{EntryStore, MemoryStore};
pub use types::{DiaryEntry, EntryId, NewEntry};
