//! Command-line interface.

mod commands;

use clap::{Parser, Subcommand};

/// Arriendos - rental listings aggregator for Envigado
#[derive(Parser)]
#[command(name = "arriendos")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the web API and the background scheduler
    #[command(alias = "daemon")]
    Serve,

    /// Scrape one source, or every source, right now
    #[command(alias = "s")]
    Scrape {
        /// Source slug, or "all"
        #[arg(long, default_value = "all")]
        source: String,
        /// Ignore the cooldown
        #[arg(long)]
        force: bool,
        /// Minimum monthly rent in COP (requires --price-max)
        #[arg(long, requires = "price_max")]
        price_min: Option<i64>,
        /// Maximum monthly rent in COP (requires --price-min)
        #[arg(long, requires = "price_min")]
        price_max: Option<i64>,
    },

    /// List stored listings, newest first
    #[command(alias = "ls")]
    List {
        /// Number of listings to show
        #[arg(long, default_value = "20")]
        limit: u64,
        /// Only show listings from this source
        #[arg(long)]
        source: Option<String>,
    },

    /// Wipe every listing and scrape history, then scrape all sources
    Reset,

    /// Create default config file
    Init,

    /// Show the registered sources and their last run
    Sources,
}

pub use commands::*;
