//! List command - page through entries.

use crate::app::App;
use crate::commands::{entry_json, summary_line};
use crate::OutputFormat;
use photodiary_core::{parse_filter, Config, DiaryEntry, Filter};
use std::time::Instant;

/// Run the list command.
pub fn run(
    config: Config,
    filter: &str,
    offset: usize,
    limit: Option<usize>,
    asc: bool,
    output: OutputFormat,
) -> anyhow::Result<()> {
    let app = App::new(config)?;
    let filter = parse_filter(filter)?;
    let limit = limit.unwrap_or(app.config.query.page_size);

    let start = Instant::now();
    let entries = page(&app, &filter, offset, limit, asc)?;
    let elapsed = start.elapsed();

    match output {
        OutputFormat::Text => {
            if entries.is_empty() {
                println!("No entries.");
                return Ok(());
            }
            for entry in &entries {
                println!("{}", summary_line(entry));
            }

            eprintln!();
            eprintln!(
                "Showing {}-{} in {:.3}ms",
                offset + 1,
                offset + entries.len(),
                elapsed.as_secs_f64() * 1000.0
            );
        }
        OutputFormat::Json => {
            let json: Vec<serde_json::Value> = entries.iter().map(entry_json).collect();
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
    }

    Ok(())
}

fn page(
    app: &App,
    filter: &Filter,
    offset: usize,
    limit: usize,
    asc: bool,
) -> anyhow::Result<Vec<DiaryEntry>> {
    if filter.is_noop() {
        return Ok(app.engine.get_sorted_page(!asc, offset, limit)?);
    }
    if asc {
        tracing::warn!("--asc is ignored for filtered listings");
    }
    Ok(app.engine.get_filtered_page(filter, offset, limit)?)
}
