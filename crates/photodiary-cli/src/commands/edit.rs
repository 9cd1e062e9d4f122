//! Edit command - change fields of an entry.

use crate::app::{parse_id, App};
use crate::EntryFields;
use photodiary_core::{parse_date_time, Config, DiaryEntry};

/// Run the edit command.
///
/// Photos and tags given on the command line are appended to the existing
/// ones unless `replace` is set.
pub fn run(
    config: Config,
    id: &str,
    date: Option<&str>,
    title: Option<String>,
    replace: bool,
    fields: EntryFields,
) -> anyhow::Result<()> {
    let app = App::new(config)?;
    let id = parse_id(id)?;

    let mut entry = app.require_entry(&id)?;

    if let Some(date) = date {
        entry.date = parse_date_time(date)?;
    }
    if let Some(title) = title {
        entry.title = title;
    }
    apply_fields(&mut entry, fields, replace);

    let entry = app.engine.update(entry)?;
    for event in app.drain_events() {
        if !event.added_photo_ids.is_empty() || !event.removed_photo_ids.is_empty() {
            println!(
                "Photos: +{} -{}",
                event.added_photo_ids.len(),
                event.removed_photo_ids.len()
            );
        }
    }

    println!("Updated {}", entry.id);
    Ok(())
}

fn apply_fields(entry: &mut DiaryEntry, fields: EntryFields, replace: bool) {
    if let Some(content) = fields.content {
        entry.content = content;
    }
    if replace {
        entry.photo_ids = fields.photos;
        entry.tags = if fields.tags.is_empty() {
            None
        } else {
            Some(fields.tags)
        };
        entry.location = fields.location;
        return;
    }

    for photo in fields.photos {
        if !entry.has_photo(&photo) {
            entry.photo_ids.push(photo);
        }
    }
    if !fields.tags.is_empty() {
        let tags = entry.tags.get_or_insert_with(Vec::new);
        for tag in fields.tags {
            if !tags.iter().any(|t| t.eq_ignore_ascii_case(&tag)) {
                tags.push(tag);
            }
        }
    }
    if fields.location.is_some() {
        entry.location = fields.location;
    }
}
