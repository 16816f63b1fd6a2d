//! Configuration management

use std::{collections::HashMap, path::Path};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Environment files to load before processing config.
    /// Loaded in order, later files override earlier.
    #[serde(default)]
    pub env_files: Vec<String>,
    /// Server configuration
    pub server: ServerConfig,
    /// Identity provider configuration
    pub oidc: OidcConfig,
    /// Rate limit configuration
    pub rate_limit: RateLimitConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Allowed CORS origins
    pub cors_origins: Vec<String>,
    /// Paths that bypass authentication
    #[serde(default = "default_public_paths")]
    pub public_paths: Vec<String>,
}

fn default_public_paths() -> Vec<String> {
    vec!["/health".to_string(), "/openapi.json".to_string()]
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            cors_origins: vec!["http://localhost:8000".to_string()],
            public_paths: default_public_paths(),
        }
    }
}

/// Identity provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OidcConfig {
    /// Azure AD tenant id. Used to derive the discovery URL when `config_url`
    /// is not set explicitly.
    pub tenant_id: Option<String>,
    /// Explicit OpenID Connect discovery URL. Takes precedence over `tenant_id`.
    pub config_url: Option<String>,
    /// The API client id — tokens must carry this as their `aud` claim
    pub client_id: String,
    /// Client id the interactive OpenAPI/Swagger client authenticates as
    pub openapi_client_id: Option<String>,
    /// OAuth scopes this API uses (scope → human-readable description),
    /// advertised in the OpenAPI security scheme
    pub scopes: HashMap<String, String>,
    /// Scopes every protected route requires (checked against the `scp` claim)
    #[serde(default = "default_required_scopes")]
    pub required_scopes: Vec<String>,
    /// Allowed token signing algorithms. Asymmetric only.
    #[serde(default = "default_algorithms")]
    pub algorithms: Vec<String>,
    /// How long to cache the discovery document, in hours
    #[serde(default = "default_config_ttl_hours")]
    pub config_ttl_hours: u64,
    /// Whether auth failure rejects the request (`true`) or yields an
    /// anonymous request (`false`) for routes with optional authentication
    #[serde(default = "default_true")]
    pub auto_error: bool,
}

fn default_required_scopes() -> Vec<String> {
    vec!["user_impersonation".to_string()]
}

fn default_algorithms() -> Vec<String> {
    vec!["RS256".to_string(), "RS384".to_string(), "RS512".to_string()]
}

fn default_config_ttl_hours() -> u64 {
    24
}

fn default_true() -> bool {
    true
}

impl Default for OidcConfig {
    fn default() -> Self {
        Self {
            tenant_id: None,
            config_url: None,
            client_id: String::new(),
            openapi_client_id: None,
            scopes: HashMap::new(),
            required_scopes: default_required_scopes(),
            algorithms: default_algorithms(),
            config_ttl_hours: default_config_ttl_hours(),
            auto_error: true,
        }
    }
}

impl OidcConfig {
    /// Resolve the discovery URL: explicit `config_url` wins, otherwise the
    /// tenant-specific Azure AD v2.0 well-known endpoint.
    pub fn discovery_url(&self) -> Result<String> {
        if let Some(ref url) = self.config_url {
            return Ok(url.clone());
        }
        let tenant = self.tenant_id.as_deref().unwrap_or("common");
        Ok(format!(
            "https://login.microsoftonline.com/{tenant}/v2.0/.well-known/openid-configuration"
        ))
    }
}

/// Rate limit configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting
    pub enabled: bool,
    /// Requests per minute per principal
    pub per_minute: u32,
    /// Burst size
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            per_minute: 100,
            burst: 20,
        }
    }
}

impl Config {
    /// Load configuration from an optional YAML file merged with
    /// `OIDC_GATEWAY_`-prefixed environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        figment = figment.merge(Env::prefixed("OIDC_GATEWAY_").split("__"));

        let config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        config.load_env_files();
        config.validate()?;

        Ok(config)
    }

    /// Load env files into the process environment
    fn load_env_files(&self) {
        for file in &self.env_files {
            if let Err(e) = dotenvy::from_path(file) {
                tracing::debug!(file = %file, error = %e, "Skipping env file");
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.oidc.client_id.is_empty() {
            return Err(Error::Config(
                "oidc.client_id must be set (the API's application/client id)".to_string(),
            ));
        }
        if self.oidc.tenant_id.is_none() && self.oidc.config_url.is_none() {
            return Err(Error::Config(
                "one of oidc.tenant_id or oidc.config_url must be set".to_string(),
            ));
        }
        if self.rate_limit.enabled && self.rate_limit.per_minute == 0 {
            return Err(Error::Config(
                "rate_limit.per_minute must be at least 1 when rate limiting is enabled"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovery_url_from_tenant_id() {
        let oidc = OidcConfig {
            tenant_id: Some("my-tenant".to_string()),
            ..OidcConfig::default()
        };

        assert_eq!(
            oidc.discovery_url().unwrap(),
            "https://login.microsoftonline.com/my-tenant/v2.0/.well-known/openid-configuration"
        );
    }

    #[test]
    fn discovery_url_defaults_to_common_tenant() {
        let oidc = OidcConfig::default();

        assert_eq!(
            oidc.discovery_url().unwrap(),
            "https://login.microsoftonline.com/common/v2.0/.well-known/openid-configuration"
        );
    }

    #[test]
    fn explicit_config_url_wins() {
        let oidc = OidcConfig {
            tenant_id: Some("ignored".to_string()),
            config_url: Some("https://idp.example/.well-known/openid-configuration".to_string()),
            ..OidcConfig::default()
        };

        assert_eq!(
            oidc.discovery_url().unwrap(),
            "https://idp.example/.well-known/openid-configuration"
        );
    }

    #[test]
    fn default_algorithms_are_rsa_only() {
        let oidc = OidcConfig::default();
        assert_eq!(oidc.algorithms, vec!["RS256", "RS384", "RS512"]);
    }

    #[test]
    fn validate_rejects_missing_client_id() {
        let config = Config {
            oidc: OidcConfig {
                tenant_id: Some("t".to_string()),
                ..OidcConfig::default()
            },
            ..Config::default()
        };

        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn validate_accepts_minimal_config() {
        let config = Config {
            oidc: OidcConfig {
                tenant_id: Some("t".to_string()),
                client_id: "api-client".to_string(),
                ..OidcConfig::default()
            },
            ..Config::default()
        };

        assert!(config.validate().is_ok());
    }
}
