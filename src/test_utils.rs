//! Test utilities for oauthgate
//!
//! This module provides the RSA fixtures and token signing helpers shared by
//! the unit tests.  The same fixture files back the integration tests under
//! `tests/common`.

use ring::rand::SystemRandom;
use ring::signature::{RsaKeyPair, RSA_PKCS1_SHA256};

use crate::cognito::jwks::JwkSet;
use crate::secure::SecurePrimitives;

/// PKCS#8 private key whose public half is published as `key-a`.
pub const SIGNING_KEY_A: &[u8] = include_bytes!("../tests/fixtures/signing_key_a.pk8");

/// PKCS#8 private key whose public half is published as `key-b`.
pub const SIGNING_KEY_B: &[u8] = include_bytes!("../tests/fixtures/signing_key_b.pk8");

/// Key set listing `key-a` and `key-b`.
pub const FIXTURE_JWKS: &str = include_str!("../tests/fixtures/jwks.json");

/// Parses [`FIXTURE_JWKS`].
///
/// # Panics
///
/// Panics if the fixture is not a valid key set
pub fn fixture_key_set() -> JwkSet {
    serde_json::from_str(FIXTURE_JWKS).expect("fixture key set must parse")
}

/// Signs `header.payload` with the PKCS#8 key and returns the compact JWT.
///
/// # Panics
///
/// Panics if the key cannot be parsed or signing fails
pub fn sign_token(key_pkcs8: &[u8], header: &serde_json::Value, payload: &serde_json::Value) -> String {
    let primitives = SecurePrimitives::new();
    let header = primitives.base64url_encode(header.to_string().as_bytes());
    let payload = primitives.base64url_encode(payload.to_string().as_bytes());
    let signing_input = format!("{header}.{payload}");

    let key_pair = RsaKeyPair::from_pkcs8(key_pkcs8).expect("fixture key must parse");
    let mut signature = vec![0u8; key_pair.public_modulus_len()];
    key_pair
        .sign(
            &RSA_PKCS1_SHA256,
            &SystemRandom::new(),
            signing_input.as_bytes(),
            &mut signature,
        )
        .expect("signing must succeed");

    format!("{signing_input}.{}", primitives.base64url_encode(&signature))
}

/// Signs `payload` with the given key under an RS256 header naming `kid`.
pub fn sign_with_kid(key_pkcs8: &[u8], kid: &str, payload: &serde_json::Value) -> String {
    sign_token(
        key_pkcs8,
        &serde_json::json!({ "kid": kid, "alg": "RS256" }),
        payload,
    )
}

/// Provider settings used by the unit tests.
pub fn test_settings() -> crate::config::ProviderSettings {
    crate::config::ProviderConfig {
        user_pool_id: Some("eu-central-1_pool".to_string()),
        client_id: Some("client-1".to_string()),
        client_secret: Some("secret".to_string()),
        domain_prefix: Some("hello".to_string()),
        region: Some("eu-central-1".to_string()),
        redirect_uri: Some("https://app.example.com/oauth/callback".to_string()),
    }
    .settings()
    .expect("test settings are complete")
}

/// A filter with the fixture key set whose provider endpoints are
/// unreachable, for exercising branches that never leave the process.
pub fn test_filter() -> crate::filter::AuthFilter {
    use crate::cognito::endpoints::Endpoints;
    use crate::cognito::jwks::KeySetCache;
    use crate::cognito::token::TokenClient;
    use crate::config::{EndpointsConfig, FilterConfig};

    let settings = test_settings();
    let overrides = EndpointsConfig {
        auth_base_url: Some("http://127.0.0.1:1".to_string()),
        jwks_url: Some("http://127.0.0.1:1/jwks.json".to_string()),
    };
    let endpoints = Endpoints::new(&settings, &overrides).expect("test endpoints parse");
    let http = reqwest::Client::new();
    let keys = KeySetCache::with_key_set(
        http.clone(),
        endpoints.jwks().clone(),
        fixture_key_set(),
        std::time::Duration::from_secs(300),
    );
    let tokens = TokenClient::new(http, &settings, &endpoints);

    crate::filter::AuthFilter::new(
        settings,
        endpoints,
        tokens,
        keys,
        &FilterConfig::default(),
        SecurePrimitives::new(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use ring::signature::RsaPublicKeyComponents;

    #[test]
    fn test_fixture_keys_are_pkcs8_and_match_published_moduli() {
        let primitives = SecurePrimitives::new();
        let set = fixture_key_set();

        for (kid, pkcs8) in [("key-a", SIGNING_KEY_A), ("key-b", SIGNING_KEY_B)] {
            let key_pair = RsaKeyPair::from_pkcs8(pkcs8).expect("fixture key must be PKCS#8");
            let public: RsaPublicKeyComponents<Vec<u8>> = key_pair.public().into();
            let published = set.resolve(kid).expect("fixture kid is published");

            assert_eq!(
                public.n,
                primitives.base64url_decode(&published.n).unwrap(),
                "modulus of {kid}"
            );
            assert_eq!(public.e, primitives.base64url_decode(&published.e).unwrap());
        }
    }
}
