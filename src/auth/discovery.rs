//! OpenID Connect discovery document fetching and caching

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::Deserialize;
use tracing::{debug, info, warn};
use url::Url;

use crate::{Error, Result};

/// Timeout for a single discovery fetch, distinct from any request timeout
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// OpenID Connect discovery document.
///
/// Immutable once fetched; replaced wholesale on refresh. Only the fields this
/// gateway depends on are kept.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryDocument {
    /// The provider's interactive authorization endpoint
    pub authorization_endpoint: Url,
    /// The provider's token endpoint
    pub token_endpoint: Url,
    /// Issuer URL tokens must carry in their `iss` claim
    pub issuer: String,
    /// Where to retrieve the provider's signing keys
    pub jwks_uri: Url,
}

#[derive(Default)]
struct CacheState {
    document: Option<DiscoveryDocument>,
    fetched_at: Option<Instant>,
}

/// Cache for the provider's discovery document.
///
/// Created empty at startup, populated on the first successful refresh, and
/// refreshed in place when older than `ttl`. One instance per configured
/// provider tenant, shared across all requests.
pub struct DiscoveryCache {
    config_url: String,
    ttl: Duration,
    http: reqwest::Client,
    state: Arc<RwLock<CacheState>>,
    /// Serializes refreshes so N concurrent stale readers trigger one fetch
    refresh_lock: tokio::sync::Mutex<()>,
}

impl DiscoveryCache {
    /// Create an empty cache for the given discovery URL
    pub fn new(config_url: impl Into<String>, ttl: Duration) -> Self {
        Self {
            config_url: config_url.into(),
            ttl,
            http: reqwest::Client::builder()
                .timeout(FETCH_TIMEOUT)
                .build()
                .unwrap_or_default(),
            state: Arc::new(RwLock::new(CacheState::default())),
            refresh_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// The currently cached document, if any
    #[must_use]
    pub fn document(&self) -> Option<DiscoveryDocument> {
        self.state.read().document.clone()
    }

    /// Whether a document has ever been fetched successfully
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.state.read().document.is_some()
    }

    /// Return the cached document, refreshing it first if it is stale.
    ///
    /// A cheap no-op while the cache is fresh. Concurrent callers observing a
    /// stale cache are serialized on the refresh lock: the first performs the
    /// fetch, the rest reuse its result. On fetch failure the last-known-good
    /// document is returned so a provider outage does not lock out users
    /// holding valid tokens; only a cold-start failure surfaces as
    /// [`Error::DiscoveryUnavailable`].
    pub async fn refresh_if_stale(&self) -> Result<DiscoveryDocument> {
        if let Some(doc) = self.get_fresh() {
            return Ok(doc);
        }

        let _guard = self.refresh_lock.lock().await;

        // Another caller may have completed the refresh while we waited
        if let Some(doc) = self.get_fresh() {
            return Ok(doc);
        }

        debug!(url = %self.config_url, "Fetching OpenID Connect configuration");

        // The fetch runs on a detached task so a cancelled caller does not
        // abort it; the task updates the shared state and other waiters can
        // still use its result.
        let handle = tokio::spawn(fetch_and_store(
            self.http.clone(),
            self.config_url.clone(),
            Arc::clone(&self.state),
        ));

        match handle.await {
            Ok(Ok(doc)) => {
                info!(
                    authorization_endpoint = %doc.authorization_endpoint,
                    token_endpoint = %doc.token_endpoint,
                    issuer = %doc.issuer,
                    "Loaded OpenID configuration"
                );
                Ok(doc)
            }
            Ok(Err(e)) => {
                // Stale-but-present beats unavailable: keep serving the
                // last-known-good document through a provider outage.
                let state = self.state.read();
                if let Some(ref doc) = state.document {
                    warn!(error = %e, "OpenID configuration refresh failed, using cached document");
                    return Ok(doc.clone());
                }
                warn!(error = %e, "Unable to load OpenID configuration");
                Err(Error::DiscoveryUnavailable(e.to_string()))
            }
            Err(e) => Err(Error::Internal(format!("discovery fetch task failed: {e}"))),
        }
    }

    fn get_fresh(&self) -> Option<DiscoveryDocument> {
        let state = self.state.read();
        match (&state.document, state.fetched_at) {
            (Some(doc), Some(at)) if at.elapsed() < self.ttl => Some(doc.clone()),
            _ => None,
        }
    }
}

async fn fetch_and_store(
    http: reqwest::Client,
    config_url: String,
    state: Arc<RwLock<CacheState>>,
) -> std::result::Result<DiscoveryDocument, reqwest::Error> {
    let doc = http
        .get(&config_url)
        .send()
        .await?
        .error_for_status()?
        .json::<DiscoveryDocument>()
        .await?;

    let mut state = state.write();
    state.document = Some(doc.clone());
    state.fetched_at = Some(Instant::now());
    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_document() -> DiscoveryDocument {
        serde_json::from_value(serde_json::json!({
            "authorization_endpoint": "https://idp.example/tenant/oauth2/authorize",
            "token_endpoint": "https://idp.example/tenant/oauth2/token",
            "issuer": "https://idp.example/tenant",
            "jwks_uri": "https://idp.example/tenant/keys"
        }))
        .unwrap()
    }

    #[test]
    fn document_parses_required_fields() {
        let doc = sample_document();
        assert_eq!(doc.issuer, "https://idp.example/tenant");
        assert_eq!(doc.jwks_uri.as_str(), "https://idp.example/tenant/keys");
    }

    #[test]
    fn document_rejects_missing_fields() {
        let result: std::result::Result<DiscoveryDocument, _> =
            serde_json::from_value(serde_json::json!({
                "issuer": "https://idp.example/tenant"
            }));
        assert!(result.is_err());
    }

    #[test]
    fn cold_cache_reports_unloaded() {
        let cache = DiscoveryCache::new("https://idp.example/config", Duration::from_secs(60));
        assert!(!cache.is_loaded());
        assert!(cache.document().is_none());
        assert!(cache.get_fresh().is_none());
    }

    #[test]
    fn populated_cache_is_fresh_within_ttl() {
        let cache = DiscoveryCache::new("https://idp.example/config", Duration::from_secs(60));
        {
            let mut state = cache.state.write();
            state.document = Some(sample_document());
            state.fetched_at = Some(Instant::now());
        }

        assert!(cache.is_loaded());
        assert!(cache.get_fresh().is_some());
    }

    #[test]
    fn populated_cache_goes_stale_after_ttl() {
        let cache = DiscoveryCache::new("https://idp.example/config", Duration::ZERO);
        {
            let mut state = cache.state.write();
            state.document = Some(sample_document());
            state.fetched_at = Some(Instant::now());
        }

        // TTL of zero: loaded but never fresh
        assert!(cache.is_loaded());
        assert!(cache.get_fresh().is_none());
    }
}
