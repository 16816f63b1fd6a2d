//! Request-facing authorization entry point

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::http::{HeaderMap, header::AUTHORIZATION};
use serde_json::json;
use tracing::debug;

use crate::auth::{DiscoveryCache, JwksCache, TokenVerifier, User};
use crate::config::OidcConfig;
use crate::{Error, Result};

/// Authenticates inbound requests against the configured OIDC provider.
///
/// Per request: refresh the discovery document if stale, extract the bearer
/// token, verify it, check required scopes, and produce a [`User`]. One
/// instance per configured provider, shared across all requests; constructed
/// at the composition root and passed by handle to the routing layer.
pub struct OidcAuthorizer {
    discovery: Arc<DiscoveryCache>,
    verifier: TokenVerifier,
    scopes: Vec<(String, String)>,
    openapi_client_id: Option<String>,
    auto_error: bool,
    initialized: AtomicBool,
}

impl OidcAuthorizer {
    /// Build an authorizer from the provider configuration
    pub fn new(config: &OidcConfig) -> Result<Self> {
        let discovery = Arc::new(DiscoveryCache::new(
            config.discovery_url()?,
            Duration::from_secs(config.config_ttl_hours * 3600),
        ));
        let jwks = Arc::new(JwksCache::new());
        let verifier = TokenVerifier::new(&config.client_id, &config.algorithms, jwks)?;

        let mut scopes: Vec<(String, String)> = config
            .scopes
            .iter()
            .map(|(scope, description)| (scope.clone(), description.clone()))
            .collect();
        scopes.sort();

        Ok(Self {
            discovery,
            verifier,
            scopes,
            openapi_client_id: config.openapi_client_id.clone(),
            auto_error: config.auto_error,
            initialized: AtomicBool::new(false),
        })
    }

    /// Perform the startup discovery load.
    ///
    /// Must complete before the first [`authenticate`](Self::authenticate)
    /// call; a cold-start fetch failure propagates and should abort startup.
    pub async fn init(&self) -> Result<()> {
        self.discovery.refresh_if_stale().await?;
        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    /// Whether `init()` has completed successfully
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// The OpenAPI OAuth2 security scheme for this provider.
    ///
    /// Advertises the live authorization and token endpoints using the
    /// authorization-code + PKCE flow. `None` until the first successful
    /// discovery fetch, so the router layer defers advertising the scheme
    /// until startup discovery completes.
    #[must_use]
    pub fn security_scheme(&self) -> Option<serde_json::Value> {
        let doc = self.discovery.document()?;
        let scopes: serde_json::Map<String, serde_json::Value> = self
            .scopes
            .iter()
            .map(|(scope, description)| (scope.clone(), json!(description)))
            .collect();

        Some(json!({
            "type": "oauth2",
            "description": "OpenID Connect authorization code flow with PKCE",
            "flows": {
                "authorizationCode": {
                    "authorizationUrl": doc.authorization_endpoint.as_str(),
                    "tokenUrl": doc.token_endpoint.as_str(),
                    "scopes": scopes,
                }
            }
        }))
    }

    /// OAuth init parameters for an interactive documentation client.
    ///
    /// `None` unless an `openapi_client_id` is configured; the interactive
    /// client authenticates as its own application, not as the API itself.
    #[must_use]
    pub fn swagger_init_oauth(&self) -> Option<serde_json::Value> {
        let client_id = self.openapi_client_id.as_deref()?;
        Some(json!({
            "clientId": client_id,
            "usePkceWithAuthorizationCodeGrant": true,
        }))
    }

    /// Authenticate a request from its headers.
    ///
    /// Returns `Ok(Some(user))` on success. With `auto_error` disabled,
    /// authentication failures yield `Ok(None)` instead of an error so routes
    /// can offer optional authentication; non-auth failures
    /// ([`Error::NotInitialized`], [`Error::DiscoveryUnavailable`]) always
    /// propagate.
    pub async fn authenticate(
        &self,
        headers: &HeaderMap,
        required_scopes: &[String],
    ) -> Result<Option<User>> {
        if !self.is_initialized() {
            return Err(Error::NotInitialized);
        }

        match self.authenticate_inner(headers, required_scopes).await {
            Ok(user) => Ok(Some(user)),
            Err(e) if e.is_auth_failure() && !self.auto_error => {
                debug!(error = %e, "Authentication failed, continuing anonymously");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn authenticate_inner(
        &self,
        headers: &HeaderMap,
        required_scopes: &[String],
    ) -> Result<User> {
        // Cheap no-op while the cached document is fresh
        let doc = self.discovery.refresh_if_stale().await?;

        let token = extract_bearer(headers)
            .ok_or_else(|| Error::invalid_auth("No access token provided"))?;

        let claims = self.verifier.verify(token, &doc.issuer, &doc.jwks_uri).await?;

        let token_scopes = parse_scopes(claims.scp.as_ref())?;
        for scope in required_scopes {
            if !token_scopes.contains(&scope.as_str()) {
                return Err(Error::invalid_auth("Required scope missing"));
            }
        }

        User::from_claims(claims, token)
    }
}

/// Extract the bearer token from the `Authorization` header.
///
/// The scheme keyword is matched case-sensitively: exactly `Bearer <token>`.
fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// Parse the `scp` claim into individual scopes.
///
/// An absent claim yields no scopes; a present claim must be a string.
fn parse_scopes(scp: Option<&serde_json::Value>) -> Result<Vec<&str>> {
    match scp {
        None => Ok(Vec::new()),
        Some(serde_json::Value::String(s)) => Ok(s.split(' ').collect()),
        Some(_) => Err(Error::invalid_auth("Token contains invalid formatted scopes")),
    }
}
