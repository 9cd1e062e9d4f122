//! Show command - print one entry.

use crate::app::{parse_id, App};
use crate::commands::entry_json;
use crate::OutputFormat;
use photodiary_core::Config;

/// Run the show command.
pub fn run(config: Config, id: &str, output: OutputFormat) -> anyhow::Result<()> {
    let app = App::new(config)?;
    let id = parse_id(id)?;

    let entry = app.require_entry(&id)?;

    match output {
        OutputFormat::Text => {
            println!("{}", entry.title);
            println!("{}", "=".repeat(entry.title.chars().count().max(1)));
            println!("Date:     {}", entry.date.format("%Y-%m-%d %H:%M"));
            if let Some(location) = &entry.location {
                println!("Location: {}", location);
            }
            if !entry.effective_tags().is_empty() {
                println!("Tags:     {}", entry.effective_tags().join(", "));
            }
            if !entry.photo_ids.is_empty() {
                println!("Photos:   {}", entry.photo_ids.join(", "));
            }
            println!("Id:       {}", entry.id);
            println!(
                "Updated:  {}",
                entry.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
            if !entry.content.is_empty() {
                println!();
                println!("{}", entry.content);
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&entry_json(&entry))?);
        }
    }
    Ok(())
}
