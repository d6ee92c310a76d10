//! HTTP middleware stack for storefront.
//!
//! # Middleware Order (bottom to top in Router)
//!
//! 1. Sentry layer (capture errors)
//! 2. `TraceLayer` (request tracing)
//! 3. Request ID (add unique ID to each request)
//! 4. Rate limiting on the refresh endpoint (governor)
//!
//! User identity comes from the upstream auth layer via the `x-user-id`
//! header and is read by the [`RequireUser`] / [`OptionalUser`] extractors.

pub mod auth;
pub mod rate_limit;
pub mod request_id;

pub use auth::{OptionalUser, RequireUser, USER_ID_HEADER};
pub use rate_limit::refresh_rate_limiter;
pub use request_id::request_id_middleware;
