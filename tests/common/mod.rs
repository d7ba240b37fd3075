//! Shared fixtures for the integration tests
//!
//! `fixtures/signing_key_{a,b}.pk8` are 2048-bit RSA keys whose public
//! halves are published in `fixtures/jwks.json` as `key-a` and `key-b`.

#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;

use ring::rand::SystemRandom;
use ring::signature::{RsaKeyPair, RSA_PKCS1_SHA256};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use oauthgate::config::{Config, EndpointsConfig, ProviderConfig};
use oauthgate::SecurePrimitives;

pub const SIGNING_KEY_A: &[u8] = include_bytes!("../fixtures/signing_key_a.pk8");
pub const SIGNING_KEY_B: &[u8] = include_bytes!("../fixtures/signing_key_b.pk8");
pub const FIXTURE_JWKS: &str = include_str!("../fixtures/jwks.json");

pub const CLIENT_ID: &str = "client-1";
pub const REDIRECT_URI: &str = "https://app.example.com/oauth/callback";
pub const ISSUER: &str = "https://cognito-idp.eu-central-1.amazonaws.com/eu-central-1_pool";
pub const JWKS_PATH: &str = "/eu-central-1_pool/.well-known/jwks.json";
pub const TOKEN_PATH: &str = "/oauth2/token";

/// `base64("client-1:secret")`
pub const BASIC_CREDENTIALS: &str = "Basic Y2xpZW50LTE6c2VjcmV0";

pub fn fixture_jwks() -> serde_json::Value {
    serde_json::from_str(FIXTURE_JWKS).expect("fixture key set must parse")
}

/// A complete configuration whose hosted UI and key set live on `server`.
pub fn mock_config(server: &MockServer) -> Config {
    Config {
        provider: ProviderConfig {
            user_pool_id: Some("eu-central-1_pool".to_string()),
            client_id: Some(CLIENT_ID.to_string()),
            client_secret: Some("secret".to_string()),
            domain_prefix: Some("hello".to_string()),
            region: Some("eu-central-1".to_string()),
            redirect_uri: Some(REDIRECT_URI.to_string()),
        },
        endpoints: EndpointsConfig {
            auth_base_url: Some(server.uri()),
            jwks_url: Some(format!("{}{}", server.uri(), JWKS_PATH)),
        },
        ..Config::default()
    }
}

/// Serves the fixture key set.
pub async fn mount_jwks(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(fixture_jwks()))
        .mount(server)
        .await;
}

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

pub fn sign_with_kid(key_pkcs8: &[u8], kid: &str, payload: &serde_json::Value) -> String {
    sign_token(
        key_pkcs8,
        &serde_json::json!({ "kid": kid, "alg": "RS256" }),
        payload,
    )
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Claims of a valid access token for [`CLIENT_ID`].
pub fn access_claims() -> serde_json::Value {
    serde_json::json!({
        "sub": "user-1",
        "iss": ISSUER,
        "token_use": "access",
        "client_id": CLIENT_ID,
        "iat": now(),
        "exp": now() + 3600,
    })
}

/// Claims of a valid identity token for [`CLIENT_ID`].
pub fn id_claims() -> serde_json::Value {
    serde_json::json!({
        "sub": "user-1",
        "iss": ISSUER,
        "token_use": "id",
        "aud": CLIENT_ID,
        "iat": now(),
        "exp": now() + 3600,
    })
}

pub fn access_token() -> String {
    sign_with_kid(SIGNING_KEY_A, "key-a", &access_claims())
}

pub fn id_token() -> String {
    sign_with_kid(SIGNING_KEY_A, "key-a", &id_claims())
}

/// Body of a successful authorization code grant.
pub fn code_grant_body() -> serde_json::Value {
    serde_json::json!({
        "access_token": access_token(),
        "id_token": id_token(),
        "refresh_token": "refresh-1",
        "token_type": "Bearer",
        "expires_in": 3600,
    })
}

/// Body of a successful refresh grant (no refresh token).
pub fn refresh_grant_body() -> serde_json::Value {
    serde_json::json!({
        "access_token": access_token(),
        "id_token": id_token(),
        "token_type": "Bearer",
        "expires_in": 3600,
    })
}

pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}
