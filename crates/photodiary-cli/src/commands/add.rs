//! Add command - write a new entry.

use crate::app::App;
use crate::EntryFields;
use photodiary_core::{parse_date_time, Config, NewEntry};

/// Run the add command.
pub fn run(config: Config, date: &str, title: String, fields: EntryFields) -> anyhow::Result<()> {
    let app = App::new(config)?;
    let date = parse_date_time(date)?;

    let mut new = NewEntry::new(date, title, fields.content.unwrap_or_default())
        .with_photos(fields.photos);
    if !fields.tags.is_empty() {
        new = new.with_tags(fields.tags);
    }
    if let Some(location) = fields.location {
        new = new.with_location(location);
    }

    let entry = app.engine.create(new)?;
    app.drain_events();

    println!("{}", entry.id);
    Ok(())
}
