//! Subcommand implementations.

pub mod add;
pub mod clear;
pub mod edit;
pub mod list;
pub mod photo;
pub mod remove;
pub mod show;
pub mod status;

use photodiary_core::DiaryEntry;

/// One-line summary of an entry
pub fn summary_line(entry: &DiaryEntry) -> String {
    let mut line = format!(
        "{}  {}  {}",
        entry.id,
        entry.date.format("%Y-%m-%d %H:%M"),
        entry.title
    );
    if !entry.photo_ids.is_empty() {
        line.push_str(&format!("  [{} photos]", entry.photo_ids.len()));
    }
    if !entry.effective_tags().is_empty() {
        line.push_str(&format!("  #{}", entry.effective_tags().join(" #")));
    }
    line
}

/// JSON representation of an entry
pub fn entry_json(entry: &DiaryEntry) -> serde_json::Value {
    serde_json::json!({
        "id": entry.id.to_string(),
        "date": entry.date.format("%Y-%m-%dT%H:%M:%S").to_string(),
        "title": entry.title,
        "content": entry.content,
        "photo_ids": entry.photo_ids,
        "location": entry.location,
        "tags": entry.tags,
        "created_at": entry.created_at.to_rfc3339(),
        "updated_at": entry.updated_at.to_rfc3339(),
    })
}
