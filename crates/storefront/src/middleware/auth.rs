//! User identity extractors.
//!
//! Authentication happens upstream. The authenticating proxy forwards the
//! user's id in the `x-user-id` header; these extractors read it and attach
//! it to the Sentry scope.

use axum::{
    Json,
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use serde_json::json;

use tea_lovers_core::UserId;

use crate::error::set_sentry_user;

/// Header carrying the authenticated user's id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Extractor that requires an authenticated user.
///
/// # Example
///
/// ```rust,ignore
/// async fn basket(RequireUser(user): RequireUser) -> impl IntoResponse {
///     format!("basket for {user}")
/// }
/// ```
pub struct RequireUser(pub UserId);

/// Error returned when a user is required but none was forwarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRejection {
    /// No `x-user-id` header.
    Missing,
    /// Header present but not a valid id.
    Malformed,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let message = match self {
            Self::Missing => "Unauthorized: sign in required",
            Self::Malformed => "Unauthorized: invalid user id",
        };
        (StatusCode::UNAUTHORIZED, Json(json!({ "error": message }))).into_response()
    }
}

fn user_from_parts(parts: &Parts) -> Result<UserId, AuthRejection> {
    let raw = parts
        .headers
        .get(USER_ID_HEADER)
        .ok_or(AuthRejection::Missing)?
        .to_str()
        .map_err(|_| AuthRejection::Malformed)?;

    raw.trim()
        .parse::<i32>()
        .ok()
        .filter(|id| *id > 0)
        .map(UserId::new)
        .ok_or(AuthRejection::Malformed)
}

impl<S> FromRequestParts<S> for RequireUser
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user = user_from_parts(parts)?;
        set_sentry_user(&user);
        tracing::Span::current().record("user_id", user.as_i32());
        Ok(Self(user))
    }
}

/// Extractor that optionally gets the current user.
///
/// Unlike `RequireUser`, a missing or malformed header yields `None`.
pub struct OptionalUser(pub Option<UserId>);

impl<S> FromRequestParts<S> for OptionalUser
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(user_from_parts(parts).ok()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::http::Request;

    use super::*;

    fn parts(header: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/basket");
        if let Some(value) = header {
            builder = builder.header(USER_ID_HEADER, value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn test_require_user_reads_header() {
        let RequireUser(user) = RequireUser::from_request_parts(&mut parts(Some("42")), &())
            .await
            .unwrap();
        assert_eq!(user, UserId::new(42));
    }

    #[tokio::test]
    async fn test_require_user_rejects_missing_and_malformed() {
        let missing = RequireUser::from_request_parts(&mut parts(None), &()).await;
        assert_eq!(missing.err(), Some(AuthRejection::Missing));

        let malformed = RequireUser::from_request_parts(&mut parts(Some("abc")), &()).await;
        assert_eq!(malformed.err(), Some(AuthRejection::Malformed));

        let zero = RequireUser::from_request_parts(&mut parts(Some("0")), &()).await;
        assert_eq!(zero.err(), Some(AuthRejection::Malformed));
    }

    #[tokio::test]
    async fn test_optional_user_never_rejects() {
        let OptionalUser(user) = OptionalUser::from_request_parts(&mut parts(None), &())
            .await
            .unwrap();
        assert!(user.is_none());
    }
}
