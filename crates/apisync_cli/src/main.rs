//! API-Sync CLI
//!
//! Maintenance tools for queue journals.
//!
//! # Commands
//!
//! - `inspect` - Summarize the items in a journal
//! - `dump` - Print raw journal records
//! - `release` - Clear the lease on an item
//! - `delete` - Remove an item
//! - `gc` - Remove items that reached the failure ceiling
//! - `compact` - Rewrite the journal with live items only

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// API-Sync queue journal tools.
#[derive(Parser)]
#[command(name = "apisync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the queue journal
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// JSON file holding the queue configuration
    #[arg(global = true, short, long)]
    config: Option<PathBuf>,

    /// Failure ceiling (overrides the configuration file)
    #[arg(global = true, long)]
    max_failures: Option<u32>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarize the items in a journal
    Inspect {
        /// List every item
        #[arg(short, long)]
        items: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print raw journal records
    Dump {
        /// Maximum number of records to print
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Clear the lease on an item
    Release {
        /// Item id
        id: u64,
    },

    /// Remove an item
    Delete {
        /// Item id
        id: u64,
    },

    /// Remove items that reached the failure ceiling
    Gc,

    /// Rewrite the journal with live items only
    Compact {
        /// Dry run - show what would be done
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let source = commands::ConfigSource {
        file: cli.config,
        max_failures: cli.max_failures,
    };

    match cli.command {
        Commands::Inspect { items, format } => {
            let path = cli.path.ok_or("Journal path required for inspect")?;
            commands::inspect::run(&path, &source, items, &format)?;
        }
        Commands::Dump { limit, format } => {
            let path = cli.path.ok_or("Journal path required for dump")?;
            commands::dump::run(&path, &source, limit, &format)?;
        }
        Commands::Release { id } => {
            let path = cli.path.ok_or("Journal path required for release")?;
            commands::items::release(&path, &source, id)?;
        }
        Commands::Delete { id } => {
            let path = cli.path.ok_or("Journal path required for delete")?;
            commands::items::delete(&path, &source, id)?;
        }
        Commands::Gc => {
            let path = cli.path.ok_or("Journal path required for gc")?;
            commands::gc::run(&path, &source)?;
        }
        Commands::Compact { dry_run } => {
            let path = cli.path.ok_or("Journal path required for compact")?;
            commands::compact::run(&path, &source, dry_run)?;
        }
        Commands::Version => {
            println!("API-Sync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
