//! Per-principal rate limiting

use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;

use dashmap::DashMap;
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};

use crate::auth::User;
use crate::config::RateLimitConfig;

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Rate limiter keyed by authenticated principal, falling back to client IP.
///
/// One governor limiter per key, created lazily on first sight.
pub struct PrincipalRateLimiter {
    enabled: bool,
    per_minute: u32,
    burst: u32,
    limiters: DashMap<String, Arc<DirectLimiter>>,
}

impl PrincipalRateLimiter {
    /// Create a limiter from configuration
    #[must_use]
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            enabled: config.enabled,
            per_minute: config.per_minute,
            burst: config.burst,
            limiters: DashMap::new(),
        }
    }

    /// Try to acquire a permit for the given key.
    /// Returns `false` when the caller is over quota.
    pub fn try_acquire(&self, key: &str) -> bool {
        if !self.enabled {
            return true;
        }

        let limiter = self
            .limiters
            .entry(key.to_string())
            .or_insert_with(|| {
                let quota =
                    Quota::per_minute(NonZeroU32::new(self.per_minute).unwrap_or(NonZeroU32::MIN))
                        .allow_burst(NonZeroU32::new(self.burst).unwrap_or(NonZeroU32::MIN));
                Arc::new(RateLimiter::direct(quota))
            })
            .clone();

        limiter.check().is_ok()
    }
}

/// The rate-limit key for a request: the principal's stable id when
/// authenticated, otherwise the client IP.
#[must_use]
pub fn rate_limit_key(user: Option<&User>, peer: Option<SocketAddr>) -> String {
    if let Some(id) = user.and_then(User::principal_id) {
        return id.to_string();
    }
    peer.map(|addr| addr.ip().to_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Claims, User};

    fn config(per_minute: u32, burst: u32) -> RateLimitConfig {
        RateLimitConfig {
            enabled: true,
            per_minute,
            burst,
        }
    }

    #[test]
    fn burst_is_enforced_per_key() {
        let limiter = PrincipalRateLimiter::new(&config(60, 2));

        assert!(limiter.try_acquire("alice"));
        assert!(limiter.try_acquire("alice"));
        assert!(!limiter.try_acquire("alice"));

        // Other keys are unaffected
        assert!(limiter.try_acquire("bob"));
    }

    #[test]
    fn disabled_limiter_always_admits() {
        let limiter = PrincipalRateLimiter::new(&RateLimitConfig {
            enabled: false,
            per_minute: 1,
            burst: 1,
        });

        for _ in 0..10 {
            assert!(limiter.try_acquire("alice"));
        }
    }

    #[test]
    fn key_prefers_principal_over_ip() {
        let claims: Claims = serde_json::from_value(serde_json::json!({
            "aud": "client-id",
            "iss": "https://idp.example/tenant",
            "exp": 2_000_000_000u64,
            "tid": "tenant-id",
            "oid": "object-id"
        }))
        .unwrap();
        let user = User::from_claims(claims, "token").unwrap();
        let peer: SocketAddr = "10.0.0.1:9999".parse().unwrap();

        assert_eq!(rate_limit_key(Some(&user), Some(peer)), "object-id");
        assert_eq!(rate_limit_key(None, Some(peer)), "10.0.0.1");
        assert_eq!(rate_limit_key(None, None), "");
    }
}
