//! Business logic services for storefront.
//!
//! # Services
//!
//! - `refresh` - Fan-out scraping of every retailer for every term, with retry and deadline
//! - `catalog` - Per-store and merged paginated catalog views
//! - `basket` - Basket validation, listing and per-store totals

pub mod basket;
pub mod catalog;
pub mod refresh;
