//! Core data types for Photodiary.
//!
//! This module defines the diary entry record and its identifier. These types
//! are designed to be:
//!
//! - **Serializable**: For persistence in the entry store
//! - **Self-describing**: The searchable text of an entry is derived from its
//!   fields alone, so any index built from them can be rebuilt at will

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier for a diary entry.
///
/// Generated once at creation and never changed afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntryId(pub Uuid);

impl EntryId {
    /// Generate a fresh random id
    pub fn new() -> Self {
        EntryId(Uuid::new_v4())
    }

    /// Get the underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EntryId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(EntryId)
    }
}

impl From<Uuid> for EntryId {
    fn from(id: Uuid) -> Self {
        EntryId(id)
    }
}

/// Truncate a diary date to its calendar day.
pub fn day_of(date: NaiveDateTime) -> NaiveDate {
    date.date()
}

/// A single diary entry.
///
/// ## Design Notes
///
/// - `date` is the day the diary is about and the only ordering key; it is
///   unrelated to `created_at`
/// - `tags` is `None` until tags have been computed for the entry, which is
///   not the same as an empty list
/// - `photo_ids` are opaque references into the user's photo library
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiaryEntry {
    /// Immutable identifier
    pub id: EntryId,

    /// Subject date of the diary
    pub date: NaiveDateTime,

    /// Entry title
    pub title: String,

    /// Entry body text
    pub content: String,

    /// Ordered references to photos in the external library
    pub photo_ids: Vec<String>,

    /// Free-form place description
    pub location: Option<String>,

    /// Tags, if they have been computed
    pub tags: Option<Vec<String>>,

    /// When the entry was first persisted
    pub created_at: DateTime<Utc>,

    /// When the entry was last persisted
    pub updated_at: DateTime<Utc>,
}

impl DiaryEntry {
    /// Calendar day of the entry's subject date
    pub fn day(&self) -> NaiveDate {
        day_of(self.date)
    }

    /// Tags to use for display and matching (empty when not yet computed)
    pub fn effective_tags(&self) -> &[String] {
        self.tags.as_deref().unwrap_or(&[])
    }

    /// Whether the entry carries a tag, ignoring case
    pub fn has_tag(&self, tag: &str) -> bool {
        let tag = tag.to_lowercase();
        self.effective_tags().iter().any(|t| t.to_lowercase() == tag)
    }

    /// Whether the entry references the given photo
    pub fn has_photo(&self, photo_id: &str) -> bool {
        self.photo_ids.iter().any(|p| p == photo_id)
    }

    /// Lowercase concatenation of title, content, tags and location.
    ///
    /// Fields are separated by newlines so a search term cannot match across
    /// the boundary of two fields.
    pub fn searchable_text(&self) -> String {
        let mut parts: Vec<&str> = Vec::with_capacity(3 + self.effective_tags().len());
        parts.push(&self.title);
        parts.push(&self.content);
        parts.extend(self.effective_tags().iter().map(String::as_str));
        if let Some(location) = &self.location {
            parts.push(location);
        }
        parts.join("\n").to_lowercase()
    }
}

/// Caller-supplied fields for a new entry.
///
/// The id and timestamps are assigned when the entry is created.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEntry {
    pub date: NaiveDateTime,
    pub title: String,
    pub content: String,
    pub photo_ids: Vec<String>,
    pub location: Option<String>,
    pub tags: Option<Vec<String>>,
}

impl NewEntry {
    /// Create a new entry with the required fields
    pub fn new(date: NaiveDateTime, title: impl Into<String>, content: impl Into<String>) -> Self {
        NewEntry {
            date,
            title: title.into(),
            content: content.into(),
            photo_ids: Vec::new(),
            location: None,
            tags: None,
        }
    }

    /// Set the photo references
    pub fn with_photos<I, S>(mut self, photo_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.photo_ids = photo_ids.into_iter().map(Into::into).collect();
        self
    }

    /// Set the location
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Set the tags
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    /// Turn into a stored entry with the given id and timestamp
    pub fn into_entry(self, id: EntryId, now: DateTime<Utc>) -> DiaryEntry {
        DiaryEntry {
            id,
            date: self.date,
            title: self.title,
            content: self.content,
            photo_ids: self.photo_ids,
            location: self.location,
            tags: self.tags,
            created_at: now,
            updated_at: now,
        }
    }
}
