//! One-off catalog refresh.
//!
//! Runs the same orchestrator the storefront's refresh endpoint uses, then
//! prints a per-task summary.
//!
//! # Usage
//!
//! ```bash
//! tl-cli scrape "earl grey, green tea"
//! tl-cli scrape "earl grey" --retailer tesco --retailer asda --dry-run --csv ./out
//! ```
//!
//! # Environment Variables
//!
//! - `STOREFRONT_DATABASE_URL` - Required unless `--dry-run` (falls back to `DATABASE_URL`)
//! - `SCRAPER_*` - Retailers, timeouts and retry settings, as for the storefront

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use tea_lovers_core::Store;
use tea_lovers_storefront::config::{ConfigError, ScraperConfig, parse_retailers};
use tea_lovers_storefront::db::{self, CatalogStore, MemoryStore, PgStore};
use tea_lovers_storefront::scraping::{HttpPageFetcher, SelectorError};
use tea_lovers_storefront::services::refresh::{RefreshOrchestrator, RefreshReport, parse_terms};

/// Errors that can occur during a one-off scrape.
#[derive(Debug, Error)]
pub enum ScrapeCommandError {
    /// No usable search terms were given.
    #[error("No search terms given")]
    NoTerms,

    /// A `--retailer` value is not a known store.
    #[error("Invalid retailer list: {0}")]
    InvalidRetailer(String),

    /// Required environment variable is missing.
    #[error("Missing environment variable: STOREFRONT_DATABASE_URL (or DATABASE_URL)")]
    MissingDatabaseUrl,

    /// Scraper settings could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A retailer's locators are invalid.
    #[error(transparent)]
    Selector(#[from] SelectorError),

    /// Database connection error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// CSV output could not be written.
    #[error("CSV export failed: {0}")]
    Csv(#[from] csv::Error),

    /// Output directory could not be created.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Parsed `scrape` arguments.
#[derive(Debug, Clone)]
pub struct ScrapeOptions {
    pub terms: String,
    pub retailers: Vec<String>,
    pub csv_dir: Option<PathBuf>,
    pub dry_run: bool,
}

/// Run one refresh and report it.
pub async fn run(options: ScrapeOptions) -> Result<(), ScrapeCommandError> {
    dotenvy::dotenv().ok();

    let terms = parse_terms(&options.terms);
    if terms.is_empty() {
        return Err(ScrapeCommandError::NoTerms);
    }

    let mut config = ScraperConfig::from_env()?;
    if !options.retailers.is_empty() {
        config.retailers = parse_retailers(&options.retailers.join(","))
            .map_err(ScrapeCommandError::InvalidRetailer)?;
    }

    let report = if options.dry_run {
        tracing::info!("Dry run: results are kept in memory");
        refresh(&config, Arc::new(MemoryStore::new()), &terms).await?
    } else {
        let database_url = super::database_url().ok_or(ScrapeCommandError::MissingDatabaseUrl)?;
        tracing::info!("Connecting to catalog database...");
        let pool = db::create_pool(&database_url).await?;
        refresh(&config, Arc::new(PgStore::new(pool)), &terms).await?
    };

    print_summary(&report, std::io::stdout().lock())?;

    if let Some(dir) = options.csv_dir {
        std::fs::create_dir_all(&dir)?;
        for store in Store::ALL {
            let rows = report_rows(&report, store);
            if rows.is_empty() {
                continue;
            }
            let path = csv_path(&dir, store);
            write_csv(File::create(&path)?, &rows)?;
            tracing::info!(path = %path.display(), rows = rows.len(), "CSV written");
        }
    }

    Ok(())
}

async fn refresh<S: CatalogStore>(
    config: &ScraperConfig,
    catalog: Arc<S>,
    terms: &[String],
) -> Result<RefreshReport, SelectorError> {
    let fetcher = Arc::new(HttpPageFetcher::from_config(config));
    let orchestrator = RefreshOrchestrator::from_config(config, fetcher, catalog)?;
    Ok(orchestrator.refresh(terms).await)
}

/// One exported row: `store,name,price`.
type CsvRow = [String; 3];

/// Scraped rows for `store` across every term, in scrape order.
fn report_rows(report: &RefreshReport, store: Store) -> Vec<CsvRow> {
    report
        .outcomes
        .iter()
        .filter(|o| o.retailer == store)
        .flat_map(|o| &o.products)
        .map(|p| {
            [
                p.store.to_string(),
                p.name.clone(),
                p.price.amount().to_string(),
            ]
        })
        .collect()
}

fn csv_path(dir: &Path, store: Store) -> PathBuf {
    dir.join(format!("{}.csv", store.as_str().to_lowercase()))
}

fn write_csv<W: Write>(out: W, rows: &[CsvRow]) -> Result<(), csv::Error> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(["store", "name", "price"])?;
    for row in rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(())
}

fn print_summary<W: Write>(report: &RefreshReport, mut out: W) -> std::io::Result<()> {
    for outcome in &report.outcomes {
        let detail = match (&outcome.abort_reason, &outcome.error) {
            (Some(reason), Some(error)) => format!("{reason:?}: {error}"),
            (Some(reason), None) => format!("{reason:?}"),
            (None, _) => format!(
                "{} products, {} new, {} existing",
                outcome.products.len(),
                outcome.created,
                outcome.existing
            ),
        };
        writeln!(
            out,
            "{:<10} {:<20} {:?} after {} attempt(s): {detail}",
            outcome.retailer.as_str(),
            outcome.term,
            outcome.state,
            outcome.attempts
        )?;
    }
    writeln!(
        out,
        "{} succeeded, {} aborted, {} new products in {} ms",
        report.succeeded(),
        report.aborted(),
        report.created(),
        report.elapsed.as_millis()
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_path_is_per_store() {
        let dir = Path::new("/tmp/out");
        assert_eq!(csv_path(dir, Store::Sainsburys), dir.join("sainsburys.csv"));
    }

    #[test]
    fn test_write_csv_quotes_commas() {
        let rows = vec![[
            "Tesco".to_string(),
            "Tea, Earl Grey 80 Bags".to_string(),
            "3.49".to_string(),
        ]];
        let mut out = Vec::new();
        write_csv(&mut out, &rows).unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "store,name,price\nTesco,\"Tea, Earl Grey 80 Bags\",3.49\n"
        );
    }

    #[test]
    fn test_summary_for_empty_report() {
        let report = RefreshReport {
            terms: vec!["tea".to_string()],
            outcomes: Vec::new(),
            elapsed: std::time::Duration::from_millis(12),
        };
        let mut out = Vec::new();
        print_summary(&report, &mut out).unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "0 succeeded, 0 aborted, 0 new products in 12 ms\n"
        );
    }
}
