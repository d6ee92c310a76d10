//! CLI subcommands.

pub mod migrate;
pub mod scrape;

use secrecy::SecretString;

/// Read the catalog database URL, falling back to `DATABASE_URL`.
pub fn database_url() -> Option<SecretString> {
    std::env::var("STOREFRONT_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .ok()
        .map(SecretString::from)
}
