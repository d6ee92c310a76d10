//! Tea Lovers CLI - Database migrations and one-off scrapes.
//!
//! # Usage
//!
//! ```bash
//! # Run catalog database migrations
//! tl-cli migrate
//!
//! # Scrape every configured retailer and store the results
//! tl-cli scrape "earl grey, green tea"
//!
//! # Scrape Tesco only, without touching the database, and dump CSVs
//! tl-cli scrape "earl grey" --retailer tesco --dry-run --csv ./out
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `scrape` - Run one catalog refresh outside the server

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "tl-cli")]
#[command(author, version, about = "Tea Lovers CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run catalog database migrations
    Migrate,
    /// Scrape retailers for one or more comma-separated terms
    Scrape {
        /// Search terms, comma-separated
        terms: String,

        /// Only scrape these retailers (repeatable)
        #[arg(short, long = "retailer")]
        retailers: Vec<String>,

        /// Write one CSV per retailer into this directory
        #[arg(long, value_name = "DIR")]
        csv: Option<PathBuf>,

        /// Keep results in memory instead of writing to the database
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Scrape {
            terms,
            retailers,
            csv,
            dry_run,
        } => {
            let options = commands::scrape::ScrapeOptions {
                terms,
                retailers,
                csv_dir: csv,
                dry_run,
            };
            commands::scrape::run(options).await?;
        }
    }
    Ok(())
}
