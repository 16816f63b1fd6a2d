//! JWKS fetching and signing-key resolution

use std::sync::Arc;
use std::time::{Duration, Instant};

use jsonwebtoken::{
    DecodingKey,
    jwk::{AlgorithmParameters, JwkSet},
};
use parking_lot::RwLock;
use tracing::{debug, warn};
use url::Url;

use crate::{Error, Result};

/// Timeout for a single JWKS fetch
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// How long a fetched key set stays fresh
const KEY_SET_TTL: Duration = Duration::from_secs(3600);

struct CachedJwks {
    keys: JwkSet,
    fetched_at: Instant,
}

/// Cache of the provider's signing keys, resolved by key id.
///
/// Lazily fetches the key set from the `jwks_uri` supplied by the current
/// discovery document. On a miss for a requested `kid` the set is re-fetched
/// exactly once (key rotation) before failing, which bounds the cost of a
/// malicious token carrying a bogus key id.
pub struct JwksCache {
    http: reqwest::Client,
    ttl: Duration,
    state: Arc<RwLock<Option<CachedJwks>>>,
    /// Serializes fetches so concurrent cold readers trigger one request
    fetch_lock: tokio::sync::Mutex<()>,
}

impl JwksCache {
    /// Create an empty cache with the default 1-hour key set TTL
    #[must_use]
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(FETCH_TIMEOUT)
                .build()
                .unwrap_or_default(),
            ttl: KEY_SET_TTL,
            state: Arc::new(RwLock::new(None)),
            fetch_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Resolve a key id to its public decoding key.
    ///
    /// Fails with [`Error::SigningKeyUnavailable`] if the key set cannot be
    /// fetched or the key id is still absent after one re-fetch.
    pub async fn get_key(&self, kid: &str, jwks_uri: &Url) -> Result<DecodingKey> {
        if let Some(key) = self.lookup_fresh(kid) {
            return Ok(key);
        }

        let _guard = self.fetch_lock.lock().await;

        // Another caller may have refreshed the set while we waited
        if let Some(key) = self.lookup_fresh(kid) {
            return Ok(key);
        }

        let was_fresh = self.is_fresh();
        self.fetch_and_store(jwks_uri).await?;
        if let Some(key) = self.lookup(kid) {
            return Ok(key);
        }

        if was_fresh {
            // The fetch above was already the single rotation re-fetch
            return Err(Error::SigningKeyUnavailable(format!(
                "unknown key id '{kid}'"
            )));
        }

        // Cold or stale load missed the kid: refresh once before failing
        debug!(kid = %kid, "Key not found in fetched JWKS, refreshing once");
        self.fetch_and_store(jwks_uri).await?;
        self.lookup(kid)
            .ok_or_else(|| Error::SigningKeyUnavailable(format!("unknown key id '{kid}'")))
    }

    fn is_fresh(&self) -> bool {
        self.state
            .read()
            .as_ref()
            .is_some_and(|cached| cached.fetched_at.elapsed() < self.ttl)
    }

    fn lookup_fresh(&self, kid: &str) -> Option<DecodingKey> {
        let state = self.state.read();
        let cached = state.as_ref()?;
        if cached.fetched_at.elapsed() >= self.ttl {
            return None;
        }
        find_key_in_jwks(&cached.keys, kid)
    }

    fn lookup(&self, kid: &str) -> Option<DecodingKey> {
        let state = self.state.read();
        find_key_in_jwks(&state.as_ref()?.keys, kid)
    }

    async fn fetch_and_store(&self, jwks_uri: &Url) -> Result<()> {
        debug!(jwks_uri = %jwks_uri, "Fetching signing key set");

        // Detached task: a cancelled caller must not abort a fetch other
        // waiters may reuse.
        let http = self.http.clone();
        let state = Arc::clone(&self.state);
        let uri = jwks_uri.clone();
        let handle = tokio::spawn(async move {
            let keys: JwkSet = http.get(uri).send().await?.error_for_status()?.json().await?;
            *state.write() = Some(CachedJwks {
                keys,
                fetched_at: Instant::now(),
            });
            Ok::<(), reqwest::Error>(())
        });

        match handle.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                warn!(jwks_uri = %jwks_uri, error = %e, "Signing key set fetch failed");
                Err(Error::SigningKeyUnavailable(e.to_string()))
            }
            Err(e) => Err(Error::Internal(format!("JWKS fetch task failed: {e}"))),
        }
    }
}

impl Default for JwksCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Find a JWK by `kid` and convert it to a `DecodingKey`.
///
/// Only asymmetric RSA keys are accepted; symmetric key material in a JWKS is
/// never trusted.
fn find_key_in_jwks(jwks: &JwkSet, kid: &str) -> Option<DecodingKey> {
    for jwk in &jwks.keys {
        let jwk_kid = jwk.common.key_id.as_deref().unwrap_or("");
        if jwk_kid != kid {
            continue;
        }

        return match &jwk.algorithm {
            AlgorithmParameters::RSA(rsa) => DecodingKey::from_rsa_components(&rsa.n, &rsa.e).ok(),
            AlgorithmParameters::EllipticCurve(_)
            | AlgorithmParameters::OctetKey(_)
            | AlgorithmParameters::OctetKeyPair(_) => None,
        };
    }
    None
}
