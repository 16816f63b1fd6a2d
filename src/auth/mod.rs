//! OpenID Connect authentication and authorization.
//!
//! # Verification flow
//!
//! 1. [`DiscoveryCache`] fetches and caches the provider's discovery document
//!    (authorization endpoint, token endpoint, issuer, JWKS location).
//! 2. [`JwksCache`] resolves the token's `kid` to a public signing key,
//!    re-fetching the key set once on an unknown `kid` (key rotation).
//! 3. [`TokenVerifier`] checks the algorithm allow-list, signature, expiry,
//!    audience and issuer.
//! 4. [`OidcAuthorizer`] orchestrates the above per request, enforces required
//!    scopes, and produces a [`User`].
//! 5. [`RoleValidator`] runs as a secondary check on already-authenticated
//!    users.
//!
//! # Security properties
//!
//! - Symmetric algorithms are rejected before any key resolution (prevents
//!   algorithm-substitution attacks).
//! - Unknown `kid` triggers a single JWKS re-fetch before failing; a token
//!   with a bogus key id cannot make the gateway hammer the provider.
//! - Expiry is checked with zero leeway against the `exp` claim.
//! - A provider outage never locks out holders of valid tokens while a cached
//!   discovery document exists; only a cold-start fetch failure propagates.

mod discovery;
mod gate;
mod jwks;
mod roles;
mod user;
mod verifier;

pub use discovery::{DiscoveryCache, DiscoveryDocument};
pub use gate::OidcAuthorizer;
pub use jwks::JwksCache;
pub use roles::RoleValidator;
pub use user::User;
pub use verifier::{Claims, TokenVerifier};
