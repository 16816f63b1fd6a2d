//! Error types for the OIDC gateway

use std::io;

use thiserror::Error;

/// Result type alias for the OIDC gateway
pub type Result<T> = std::result::Result<T, Error>;

/// OIDC gateway errors
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The authorizer was used before `init()` completed.
    ///
    /// This is a startup-ordering bug, not a user-facing auth failure; it
    /// should abort startup rather than be swallowed per-request.
    #[error("Authorizer not initialized. Did you forget to init() on application startup?")]
    NotInitialized,

    /// Identity provider unreachable and no cached discovery document exists
    #[error("OpenID discovery unavailable: {0}")]
    DiscoveryUnavailable(String),

    /// Signing key not found after one JWKS re-fetch, or key endpoint unreachable
    #[error("Signing key unavailable: {0}")]
    SigningKeyUnavailable(String),

    /// Authentication/authorization failure (HTTP 401, `WWW-Authenticate: Bearer`)
    ///
    /// The reason string is coarse by design; raw cryptographic failure detail
    /// stays in server-side logs.
    #[error("Unauthorized: {0}")]
    InvalidAuth(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Request payload failed validation
    #[error("Validation error: {0}")]
    Validation(String),

    /// Rate limit exceeded for the calling principal
    #[error("Rate limit exceeded")]
    RateLimited,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an auth failure with a coarse reason string
    pub fn invalid_auth(reason: impl Into<String>) -> Self {
        Self::InvalidAuth(reason.into())
    }

    /// Whether this error is an authentication/authorization failure.
    ///
    /// `SigningKeyUnavailable` counts: a token referencing a key the provider
    /// does not publish is indistinguishable from a forged token.
    #[must_use]
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::InvalidAuth(_) | Self::SigningKeyUnavailable(_))
    }
}
