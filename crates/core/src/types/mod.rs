//! Core types for Tea Lovers.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod id;
pub mod price;
pub mod store;

pub use id::*;
pub use price::Price;
pub use store::{Store, StoreParseError};
