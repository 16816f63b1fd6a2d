//! Authenticated principal record

use serde::Serialize;

use crate::auth::Claims;
use crate::{Error, Result};

/// The authenticated principal, built from verified claims.
///
/// Request-scoped: created once per successful authentication, attached to the
/// request as an extension, and discarded when the request completes. Never
/// mutated after creation.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    /// Audience the token was issued for (the API client id)
    pub audience: String,
    /// Tenant the principal belongs to
    pub tenant: String,
    /// Roles (groups) the principal has for this app
    pub roles: Vec<String>,
    /// Space-delimited scope string, if the token carried one
    pub scope: Option<String>,
    /// Display name, if the token carried one
    pub display_name: Option<String>,
    /// The full verified claims
    pub claims: Claims,
    /// The raw bearer token, retained for downstream calls on the
    /// principal's behalf
    pub access_token: String,
}

impl User {
    /// Build a principal from verified claims and the raw token
    pub fn from_claims(claims: Claims, access_token: impl Into<String>) -> Result<Self> {
        let tenant = claims
            .tid
            .clone()
            .ok_or_else(|| Error::invalid_auth("Token missing tenant claim"))?;

        let roles = match claims.roles {
            Some(serde_json::Value::Array(ref values)) => values
                .iter()
                .filter_map(|v| v.as_str().map(ToString::to_string))
                .collect(),
            _ => Vec::new(),
        };

        let scope = match claims.scp {
            Some(serde_json::Value::String(ref s)) => Some(s.clone()),
            _ => None,
        };

        Ok(Self {
            audience: claims.aud.clone(),
            tenant,
            roles,
            scope,
            display_name: claims.name.clone(),
            claims,
            access_token: access_token.into(),
        })
    }

    /// A stable identifier for this principal: the `oid` claim, falling back
    /// to `sub`. Used as the rate-limit key.
    #[must_use]
    pub fn principal_id(&self) -> Option<&str> {
        self.claims
            .oid
            .as_deref()
            .or(self.claims.sub.as_deref())
    }
}
