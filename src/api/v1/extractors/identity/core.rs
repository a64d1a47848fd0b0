use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::{StatusCode, request::Parts};

use super::ValidatedIdentity;

/// Extractor for handlers that require an authenticated identity.
/// The OAuth2 chain inserts `ValidatedIdentity` into request extensions;
/// bypassed or unauthenticated requests are rejected with 401.
pub struct IdentityExtractor(pub ValidatedIdentity);

impl<S> FromRequestParts<S> for IdentityExtractor
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<ValidatedIdentity>()
            .cloned()
            .map(IdentityExtractor)
            .ok_or(StatusCode::UNAUTHORIZED)
    }
}

/// Same as [`IdentityExtractor`] but never rejects: bypassed requests see `None`.
pub struct OptionalIdentity(pub Option<ValidatedIdentity>);

impl<S> FromRequestParts<S> for OptionalIdentity
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(OptionalIdentity(
            parts.extensions.get::<ValidatedIdentity>().cloned(),
        ))
    }
}
