//! Photo command - find entries referencing a photo.

use crate::app::App;
use crate::commands::summary_line;
use photodiary_core::Config;

/// Run the photo command.
pub fn run(config: Config, photo_id: &str) -> anyhow::Result<()> {
    let app = App::new(config)?;
    let entries = app.engine.get_by_photo_id(photo_id)?;

    if entries.is_empty() {
        println!("No entry references photo {}.", photo_id);
        return Ok(());
    }

    for entry in &entries {
        println!("{}", summary_line(entry));
    }
    Ok(())
}
