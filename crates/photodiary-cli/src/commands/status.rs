//! Status command - show store and index statistics.

use crate::app::App;
use photodiary_core::{Config, Filter};
use std::time::Instant;

/// Run the status command.
pub fn run(config: Config) -> anyhow::Result<()> {
    let app = App::new(config)?;

    println!("Photodiary Status");
    println!("=================");
    println!();

    let start = Instant::now();
    app.engine.initialize()?;
    let build_time = start.elapsed();

    let count = app.engine.count()?;
    if count == 0 {
        println!("The diary is empty. Add an entry with 'photodiary add'.");
        println!();
        println!("Data directory: {}", app.data_dir.display());
        return Ok(());
    }

    let newest = app.engine.get_filtered_page(&Filter::new(), 0, 1)?;
    let oldest = app.engine.get_sorted(false)?;
    let photos: usize = oldest.iter().map(|e| e.photo_ids.len()).sum();

    println!("Summary:");
    println!("  Entries:           {}", count);
    println!("  Photo references:  {}", photos);
    if let (Some(first), Some(last)) = (oldest.first(), newest.first()) {
        println!(
            "  Date span:         {} .. {}",
            first.date.format("%Y-%m-%d"),
            last.date.format("%Y-%m-%d")
        );
        let days = app
            .engine
            .days_with_entries(first.day(), last.day())?
            .len();
        println!("  Days with entries: {}", days);
    }
    println!(
        "  Index built in:    {:.3}ms",
        build_time.as_secs_f64() * 1000.0
    );

    let tags = app.engine.tag_counts()?;
    if !tags.is_empty() {
        println!();
        println!("Top tags:");
        for (tag, n) in tags.iter().take(10) {
            println!("  {:<20} {}", tag, n);
        }
    }

    match app.engine.verify() {
        Ok(()) => println!("\nIndex: ✓ consistent"),
        Err(e) => println!("\nIndex: ⚠ {}", e),
    }

    println!();
    println!("Data directory: {}", app.data_dir.display());

    Ok(())
}
