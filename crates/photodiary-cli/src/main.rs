//! # Photodiary CLI
//!
//! Command-line interface for the Photodiary engine.
//!
//! ## Commands
//!
//! - `photodiary add <date> <title>` - Write a new entry
//! - `photodiary edit <id>` - Change fields of an entry
//! - `photodiary remove <id>` - Delete an entry
//! - `photodiary list [filter]` - List entries, newest first
//! - `photodiary show <id>` - Print one entry in full
//! - `photodiary photo <photo-id>` - Find the entries referencing a photo
//! - `photodiary status` - Show store and index statistics
//! - `photodiary clear` - Delete all diary data
//!
//! ## Example Usage
//!
//! ```bash
//! photodiary add 2024-03-01T18:30 "Beach" --content "Sunset over the water" --photo IMG_0412 --tag travel
//!
//! # Entries mentioning "sunset" in January, tagged travel or family
//! photodiary list "sunset from:2024-01-01 to:2024-01-31 tag:travel,family"
//!
//! photodiary list --offset 50 --limit 50 --output json
//! ```

mod app;
mod commands;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Photodiary - a dated diary of your photos
#[derive(Parser, Debug)]
#[command(name = "photodiary")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, env = "PHOTODIARY_CONFIG")]
    config: Option<PathBuf>,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a new diary entry
    Add {
        /// Diary date (YYYY-MM-DD or YYYY-MM-DDTHH:MM)
        date: String,

        /// Entry title
        title: String,

        #[command(flatten)]
        fields: EntryFields,
    },

    /// Change fields of an existing entry
    Edit {
        /// Entry id
        id: String,

        /// New diary date (YYYY-MM-DD or YYYY-MM-DDTHH:MM)
        #[arg(short, long)]
        date: Option<String>,

        /// New title
        #[arg(long)]
        title: Option<String>,

        /// Replace photos, tags and location instead of keeping them
        #[arg(long)]
        replace: bool,

        #[command(flatten)]
        fields: EntryFields,
    },

    /// Delete an entry
    #[command(alias = "rm")]
    Remove {
        /// Entry id
        id: String,
    },

    /// List entries, newest first
    #[command(alias = "ls")]
    List {
        /// Filter, e.g. "sunset tag:travel from:2024-01-01 to:2024-01-31"
        #[arg(default_value = "")]
        filter: String,

        /// Entries to skip
        #[arg(long, default_value = "0")]
        offset: usize,

        /// Maximum number of entries (defaults to the configured page size)
        #[arg(short, long)]
        limit: Option<usize>,

        /// Oldest first (unfiltered listings only)
        #[arg(long)]
        asc: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        output: OutputFormat,
    },

    /// Print one entry in full
    Show {
        /// Entry id
        id: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        output: OutputFormat,
    },

    /// Find the entries referencing a photo
    Photo {
        /// Photo identifier from the photo library
        photo_id: String,
    },

    /// Show store and index statistics
    Status,

    /// Delete all diary data
    Clear {
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

/// Optional entry fields shared by `add` and `edit`
#[derive(Args, Debug, Default)]
pub struct EntryFields {
    /// Entry text
    #[arg(long)]
    pub content: Option<String>,

    /// Photo reference (repeatable)
    #[arg(short, long = "photo")]
    pub photos: Vec<String>,

    /// Tag (repeatable)
    #[arg(short, long = "tag")]
    pub tags: Vec<String>,

    /// Place description
    #[arg(long)]
    pub location: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match &cli.config {
        Some(path) => photodiary_core::Config::load_from(path)?,
        None => photodiary_core::Config::load()?,
    };

    // Setup logging
    let log_level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => config.general.log_level.as_str(),
            1 => "debug",
            _ => "trace",
        }
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .init();

    // Execute command
    match cli.command {
        Commands::Add {
            date,
            title,
            fields,
        } => commands::add::run(config, &date, title, fields),
        Commands::Edit {
            id,
            date,
            title,
            replace,
            fields,
        } => commands::edit::run(config, &id, date.as_deref(), title, replace, fields),
        Commands::Remove { id } => commands::remove::run(config, &id),
        Commands::List {
            filter,
            offset,
            limit,
            asc,
            output,
        } => commands::list::run(config, &filter, offset, limit, asc, output),
        Commands::Show { id, output } => commands::show::run(config, &id, output),
        Commands::Photo { photo_id } => commands::photo::run(config, &photo_id),
        Commands::Status => commands::status::run(config),
        Commands::Clear { yes } => commands::clear::run(config, yes),
    }
}
