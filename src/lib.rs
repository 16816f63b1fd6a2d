//! OIDC Gateway Library
//!
//! Web API gateway that authenticates bearer tokens against an OpenID Connect
//! identity provider (Azure AD and compatible), rate-limits requests per
//! principal, and exposes a couple of sample CRUD endpoints.
//!
//! # Features
//!
//! - **OIDC discovery**: lazily fetched, 24h-cached discovery document with
//!   single-flight refresh and last-known-good fallback
//! - **JWKS resolution**: cached signing keys, one forced re-fetch on unknown
//!   `kid` (key rotation)
//! - **Token verification**: RS256/RS384/RS512 allow-list, signature, expiry,
//!   audience and issuer checks
//! - **Scope and role authorization**: `scp`-based route guards plus a
//!   secondary role check on authenticated principals
//! - **Rate limiting**: per-principal quotas with client-IP fallback

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod rate_limit;
pub mod server;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => {
            subscriber.with(fmt::layer().json()).init();
        }
        _ => {
            subscriber.with(fmt::layer()).init();
        }
    }

    Ok(())
}
