//! Domain models for the catalog and baskets.

pub mod basket;
pub mod product;

pub use basket::BasketLine;
pub use product::{NewProduct, Product, ScrapeResult};
