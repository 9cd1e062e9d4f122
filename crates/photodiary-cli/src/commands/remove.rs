//! Remove command - delete an entry.

use crate::app::{parse_id, App};
use photodiary_core::Config;

/// Run the remove command.
pub fn run(config: Config, id: &str) -> anyhow::Result<()> {
    let app = App::new(config)?;
    let id = parse_id(id)?;

    match app.engine.delete(&id)? {
        Some(entry) => {
            app.drain_events();
            println!("Deleted \"{}\" ({})", entry.title, entry.id);
        }
        None => println!("No entry with id {}. Nothing to delete.", id),
    }
    Ok(())
}
