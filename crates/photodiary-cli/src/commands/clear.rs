//! Clear command - delete the diary store.

use crate::app::open_store;
use photodiary_core::{Config, EntryStore};
use std::io::{self, BufRead, Write};
use tracing::info;

/// Run the clear command.
///
/// The store is opened the same way every other command opens it, so an
/// unreadable store file is only discarded when `recreate_on_mismatch` is set.
pub fn run(config: Config, skip_confirm: bool) -> anyhow::Result<()> {
    let store = open_store(&config)?;

    if !store.exists() && !store.backup_path().exists() {
        println!("No diary found. Nothing to clear.");
        return Ok(());
    }

    let count = store.count()?;
    if !skip_confirm {
        print!(
            "Delete {} diary {} in {}? [y/N] ",
            count,
            if count == 1 { "entry" } else { "entries" },
            store.store_path().display()
        );
        io::stdout().flush()?;
        if !confirmed(io::stdin().lock())? {
            println!("Cancelled.");
            return Ok(());
        }
    }

    store.clear()?;
    info!(entries = count, "Diary store cleared");
    println!("Deleted {} entries.", count);
    Ok(())
}

fn confirmed(mut input: impl BufRead) -> io::Result<bool> {
    let mut answer = String::new();
    input.read_line(&mut answer)?;
    let answer = answer.trim();
    Ok(answer.eq_ignore_ascii_case("y") || answer.eq_ignore_ascii_case("yes"))
}
