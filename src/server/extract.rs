//! Extractors for the authenticated principal

use std::convert::Infallible;

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::Error;
use crate::auth::User;

/// Extractor for the authenticated principal.
///
/// Rejects with 401 if no prior authentication attached a [`User`] to the
/// request.
pub struct CurrentUser(pub User);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<User>()
            .cloned()
            .map(CurrentUser)
            .ok_or_else(|| Error::invalid_auth("User is required"))
    }
}

/// Infallible extractor for routes with optional authentication
pub struct MaybeUser(pub Option<User>);

impl<S> FromRequestParts<S> for MaybeUser
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(parts.extensions.get::<User>().cloned()))
    }
}
