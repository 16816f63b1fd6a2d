//! Bearer token decoding and cryptographic verification

use std::str::FromStr;
use std::sync::Arc;

use jsonwebtoken::{Algorithm, TokenData, Validation, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use tracing::warn;
use url::Url;

use crate::auth::JwksCache;
use crate::{Error, Result};

/// Claims extracted from a verified token.
///
/// The fields this gateway depends on are first-class; everything else the
/// provider sends lands in `extra` so nothing is lost for downstream use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Audience (the API client id)
    pub aud: String,
    /// Issuer
    pub iss: String,
    /// Expiry as a Unix timestamp in seconds
    pub exp: u64,
    /// Azure AD tenant id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tid: Option<String>,
    /// Subject (opaque user id)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    /// Azure AD object id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oid: Option<String>,
    /// Display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Space-delimited scope string. Shape is validated where it is consumed,
    /// so a malformed claim produces a scope error rather than a decode error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scp: Option<serde_json::Value>,
    /// Application roles. Shape is validated by the role check.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<serde_json::Value>,
    /// Provider-specific extension claims
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Verifies bearer tokens against the provider's signing keys.
///
/// Stateless apart from the shared [`JwksCache`]; the expected issuer and
/// JWKS location come from the caller's current discovery document.
pub struct TokenVerifier {
    audience: String,
    algorithms: Vec<Algorithm>,
    jwks: Arc<JwksCache>,
}

impl TokenVerifier {
    /// Create a verifier for the given audience and algorithm allow-list.
    ///
    /// Only asymmetric RSA algorithms are accepted in the allow-list; listing
    /// a symmetric algorithm is a configuration error.
    pub fn new(
        audience: impl Into<String>,
        algorithms: &[String],
        jwks: Arc<JwksCache>,
    ) -> Result<Self> {
        let algorithms = algorithms
            .iter()
            .map(|name| parse_algorithm(name))
            .collect::<Result<Vec<_>>>()?;

        if algorithms.is_empty() {
            return Err(Error::Config(
                "token algorithm allow-list must not be empty".to_string(),
            ));
        }

        Ok(Self {
            audience: audience.into(),
            algorithms,
            jwks,
        })
    }

    /// Decode and verify a bearer token, producing its claims.
    ///
    /// Header parsing and the algorithm allow-list check run before any key
    /// resolution; a malformed or symmetric-algorithm token never triggers a
    /// JWKS fetch.
    pub async fn verify(&self, token: &str, issuer: &str, jwks_uri: &Url) -> Result<Claims> {
        let header = jsonwebtoken::decode_header(token).map_err(|e| {
            warn!(error = %e, "Failed to parse token header");
            Error::invalid_auth("Invalid token")
        })?;

        if !self.algorithms.contains(&header.alg) {
            warn!(alg = ?header.alg, "Token algorithm not in allow-list");
            return Err(Error::invalid_auth("Token algorithm not allowed"));
        }

        let kid = header
            .kid
            .ok_or_else(|| Error::invalid_auth("Token header missing key id"))?;

        let key = self.jwks.get_key(&kid, jwks_uri).await?;

        let mut validation = Validation::new(header.alg);
        validation.leeway = 0;
        validation.set_audience(&[&self.audience]);
        validation.set_issuer(&[issuer]);
        validation.set_required_spec_claims(&["exp", "aud", "iss"]);

        let token_data: TokenData<Claims> =
            jsonwebtoken::decode(token, &key, &validation).map_err(|e| {
                warn!(error = %e, "Token validation failed");
                Error::invalid_auth(coarse_reason(e.kind()))
            })?;

        Ok(token_data.claims)
    }
}

fn parse_algorithm(name: &str) -> Result<Algorithm> {
    let alg = Algorithm::from_str(name)
        .map_err(|_| Error::Config(format!("unknown token algorithm '{name}'")))?;
    match alg {
        Algorithm::RS256 | Algorithm::RS384 | Algorithm::RS512 => Ok(alg),
        other => Err(Error::Config(format!(
            "token algorithm {other:?} is not allowed (asymmetric RSA only)"
        ))),
    }
}

/// Map a verification failure to a coarse client-visible reason.
///
/// Raw library error text stays in server-side logs only.
fn coarse_reason(kind: &ErrorKind) -> &'static str {
    match kind {
        ErrorKind::ExpiredSignature => "Token expired",
        ErrorKind::InvalidAudience => "Invalid token audience",
        ErrorKind::InvalidIssuer => "Invalid token issuer",
        ErrorKind::InvalidSignature => "Invalid token signature",
        _ => "Invalid token",
    }
}
