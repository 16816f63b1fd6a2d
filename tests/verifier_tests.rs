//! Token verification against a mock identity provider's JWKS

mod common;

use std::sync::Arc;

use pretty_assertions::assert_eq;
use url::Url;

use oidc_gateway::Error;
use oidc_gateway::auth::{JwksCache, TokenVerifier};

use common::{CLIENT_ID, MockIdp, TEST_KID, default_claims, now_secs, sign_symmetric_token, sign_token};

fn rsa_algorithms() -> Vec<String> {
    vec!["RS256".to_string(), "RS384".to_string(), "RS512".to_string()]
}

fn verifier(jwks: Arc<JwksCache>) -> TokenVerifier {
    TokenVerifier::new(CLIENT_ID, &rsa_algorithms(), jwks).unwrap()
}

#[tokio::test]
async fn valid_token_verifies() {
    let idp = MockIdp::spawn().await;
    let jwks = Arc::new(JwksCache::new());
    let verifier = verifier(Arc::clone(&jwks));
    let jwks_uri = Url::parse(&idp.jwks_url()).unwrap();

    let token = sign_token(&default_claims(&idp.issuer()), TEST_KID);
    let claims = verifier.verify(&token, &idp.issuer(), &jwks_uri).await.unwrap();

    assert_eq!(claims.aud, CLIENT_ID);
    assert_eq!(claims.iss, idp.issuer());
    assert_eq!(claims.tid.as_deref(), Some("test-tenant-id"));
    assert_eq!(claims.name.as_deref(), Some("Ada Lovelace"));
    assert_eq!(idp.jwks_hits(), 1);
}

#[tokio::test]
async fn concurrent_cold_verifications_fetch_the_key_set_once() {
    let idp = MockIdp::spawn().await;
    let jwks = Arc::new(JwksCache::new());
    let verifier = Arc::new(verifier(Arc::clone(&jwks)));
    let jwks_uri = Url::parse(&idp.jwks_url()).unwrap();

    let token = sign_token(&default_claims(&idp.issuer()), TEST_KID);
    let issuer = idp.issuer();

    let tasks: Vec<_> = (0..50)
        .map(|_| {
            let verifier = Arc::clone(&verifier);
            let token = token.clone();
            let issuer = issuer.clone();
            let jwks_uri = jwks_uri.clone();
            tokio::spawn(async move { verifier.verify(&token, &issuer, &jwks_uri).await })
        })
        .collect();

    for task in tasks {
        let claims = task.await.unwrap().unwrap();
        assert_eq!(claims.aud, CLIENT_ID);
    }

    assert_eq!(idp.jwks_hits(), 1);
}

#[tokio::test]
async fn symmetric_algorithm_fails_before_key_resolution() {
    let idp = MockIdp::spawn().await;
    let jwks = Arc::new(JwksCache::new());
    let verifier = verifier(Arc::clone(&jwks));
    let jwks_uri = Url::parse(&idp.jwks_url()).unwrap();

    let token = sign_symmetric_token(&default_claims(&idp.issuer()), TEST_KID);
    let result = verifier.verify(&token, &idp.issuer(), &jwks_uri).await;

    match result {
        Err(Error::InvalidAuth(reason)) => assert_eq!(reason, "Token algorithm not allowed"),
        other => panic!("expected InvalidAuth, got {other:?}"),
    }
    // Rejected before any JWKS fetch was attempted
    assert_eq!(idp.jwks_hits(), 0);
}

#[tokio::test]
async fn malformed_token_fails_before_key_resolution() {
    let idp = MockIdp::spawn().await;
    let jwks = Arc::new(JwksCache::new());
    let verifier = verifier(Arc::clone(&jwks));
    let jwks_uri = Url::parse(&idp.jwks_url()).unwrap();

    let result = verifier.verify("not-a-jwt", &idp.issuer(), &jwks_uri).await;

    assert!(matches!(result, Err(Error::InvalidAuth(_))));
    assert_eq!(idp.jwks_hits(), 0);
}

#[tokio::test]
async fn missing_kid_is_rejected() {
    let idp = MockIdp::spawn().await;
    let jwks = Arc::new(JwksCache::new());
    let verifier = verifier(Arc::clone(&jwks));
    let jwks_uri = Url::parse(&idp.jwks_url()).unwrap();

    // Sign without a kid in the header
    let key = jsonwebtoken::EncodingKey::from_rsa_pem(common::TEST_RSA_PEM.as_bytes()).unwrap();
    let header = jsonwebtoken::Header::new(jsonwebtoken::Algorithm::RS256);
    let token = jsonwebtoken::encode(&header, &default_claims(&idp.issuer()), &key).unwrap();

    let result = verifier.verify(&token, &idp.issuer(), &jwks_uri).await;

    assert!(matches!(result, Err(Error::InvalidAuth(_))));
    assert_eq!(idp.jwks_hits(), 0);
}

#[tokio::test]
async fn audience_mismatch_fails_despite_valid_signature() {
    let idp = MockIdp::spawn().await;
    let jwks = Arc::new(JwksCache::new());
    let verifier = verifier(Arc::clone(&jwks));
    let jwks_uri = Url::parse(&idp.jwks_url()).unwrap();

    let mut claims = default_claims(&idp.issuer());
    claims["aud"] = serde_json::json!("some-other-client");
    let token = sign_token(&claims, TEST_KID);

    match verifier.verify(&token, &idp.issuer(), &jwks_uri).await {
        Err(Error::InvalidAuth(reason)) => assert_eq!(reason, "Invalid token audience"),
        other => panic!("expected InvalidAuth, got {other:?}"),
    }
}

#[tokio::test]
async fn issuer_mismatch_is_rejected() {
    let idp = MockIdp::spawn().await;
    let jwks = Arc::new(JwksCache::new());
    let verifier = verifier(Arc::clone(&jwks));
    let jwks_uri = Url::parse(&idp.jwks_url()).unwrap();

    let mut claims = default_claims(&idp.issuer());
    claims["iss"] = serde_json::json!("https://evil.example/tenant");
    let token = sign_token(&claims, TEST_KID);

    match verifier.verify(&token, &idp.issuer(), &jwks_uri).await {
        Err(Error::InvalidAuth(reason)) => assert_eq!(reason, "Invalid token issuer"),
        other => panic!("expected InvalidAuth, got {other:?}"),
    }
}

#[tokio::test]
async fn expired_token_is_rejected_with_zero_leeway() {
    let idp = MockIdp::spawn().await;
    let jwks = Arc::new(JwksCache::new());
    let verifier = verifier(Arc::clone(&jwks));
    let jwks_uri = Url::parse(&idp.jwks_url()).unwrap();

    let mut claims = default_claims(&idp.issuer());
    claims["exp"] = serde_json::json!(now_secs() - 30);
    let token = sign_token(&claims, TEST_KID);

    match verifier.verify(&token, &idp.issuer(), &jwks_uri).await {
        Err(Error::InvalidAuth(reason)) => assert_eq!(reason, "Token expired"),
        other => panic!("expected InvalidAuth, got {other:?}"),
    }
}

#[tokio::test]
async fn unknown_kid_triggers_exactly_one_refetch() {
    let idp = MockIdp::spawn().await;
    let jwks = Arc::new(JwksCache::new());
    let verifier = verifier(Arc::clone(&jwks));
    let jwks_uri = Url::parse(&idp.jwks_url()).unwrap();

    // Prime the key set cache with a valid token
    let token = sign_token(&default_claims(&idp.issuer()), TEST_KID);
    verifier.verify(&token, &idp.issuer(), &jwks_uri).await.unwrap();
    assert_eq!(idp.jwks_hits(), 1);

    // A token referencing a key the provider never published: one re-fetch,
    // then failure
    let bogus = sign_token(&default_claims(&idp.issuer()), "no-such-kid");
    let result = verifier.verify(&bogus, &idp.issuer(), &jwks_uri).await;

    assert!(matches!(result, Err(Error::SigningKeyUnavailable(_))));
    assert_eq!(idp.jwks_hits(), 2);
}

#[tokio::test]
async fn key_rotation_is_picked_up_by_the_refetch() {
    let idp = MockIdp::spawn().await;
    let jwks = Arc::new(JwksCache::new());
    let verifier = verifier(Arc::clone(&jwks));
    let jwks_uri = Url::parse(&idp.jwks_url()).unwrap();

    // Prime the cache with the old key
    let token = sign_token(&default_claims(&idp.issuer()), TEST_KID);
    verifier.verify(&token, &idp.issuer(), &jwks_uri).await.unwrap();

    // Provider rotates: a new kid appears in the JWKS
    idp.set_kids(&[TEST_KID, "rotated-key"]);
    let rotated = sign_token(&default_claims(&idp.issuer()), "rotated-key");

    let claims = verifier.verify(&rotated, &idp.issuer(), &jwks_uri).await.unwrap();
    assert_eq!(claims.aud, CLIENT_ID);
    assert_eq!(idp.jwks_hits(), 2);
}

#[tokio::test]
async fn jwks_endpoint_failure_is_signing_key_unavailable() {
    let idp = MockIdp::spawn().await;
    idp.set_fail_jwks(true);

    let jwks = Arc::new(JwksCache::new());
    let verifier = verifier(Arc::clone(&jwks));
    let jwks_uri = Url::parse(&idp.jwks_url()).unwrap();

    let token = sign_token(&default_claims(&idp.issuer()), TEST_KID);
    let result = verifier.verify(&token, &idp.issuer(), &jwks_uri).await;

    assert!(matches!(result, Err(Error::SigningKeyUnavailable(_))));
}
