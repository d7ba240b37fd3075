//! End-to-end request classification tests using wiremock
//!
//! Drives `AuthFilter::handle` through the callback, valid-session,
//! refresh and anonymous branches against a mocked user pool.

mod common;

use std::collections::HashMap;

use chrono::{Duration, Utc};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use oauthgate::filter::{AuthFilter, FilterOutcome, RequestInfo};
use oauthgate::session::{
    CookieJar, MemoryCookies, MemorySession, Session, ACCESS_TOKEN_EXPIRATION_KEY,
    ACCESS_TOKEN_KEY, CODE_VERIFIER_KEY, IDENTITY_TOKEN_KEY, REFRESH_TOKEN_COOKIE_MAX_AGE,
    REFRESH_TOKEN_COOKIE_NAME, STATE_KEY,
};

use common::{mock_config, mount_jwks, REDIRECT_URI, TOKEN_PATH};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn filter_for(server: &MockServer) -> AuthFilter {
    mount_jwks(server).await;
    AuthFilter::from_config(&mock_config(server))
        .await
        .expect("filter should start")
}

fn callback(state: &str, code: &str) -> RequestInfo {
    let mut params = HashMap::new();
    params.insert("state".to_string(), state.to_string());
    params.insert("code".to_string(), code.to_string());
    RequestInfo::new(REDIRECT_URI, params)
}

fn page() -> RequestInfo {
    RequestInfo::new("https://app.example.com/reports", HashMap::new())
}

/// A session with a pending authorization.
fn pending_session() -> MemorySession {
    let mut session = MemorySession::new("session-1");
    session.set(STATE_KEY, "state-123".to_string());
    session.set(CODE_VERIFIER_KEY, "verifier-123".to_string());
    session
}

async fn mount_token_response(server: &MockServer, status: u16, body: serde_json::Value) {
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .mount(server)
        .await;
}

fn snapshot(session: &MemorySession) -> Vec<Option<String>> {
    [
        ACCESS_TOKEN_KEY,
        ACCESS_TOKEN_EXPIRATION_KEY,
        IDENTITY_TOKEN_KEY,
        STATE_KEY,
        CODE_VERIFIER_KEY,
    ]
    .iter()
    .map(|k| session.get(k))
    .collect()
}

// ---------------------------------------------------------------------------
// Callback
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_successful_callback_populates_session_and_redirects() {
    let server = MockServer::start().await;
    let filter = filter_for(&server).await;

    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("code=code-1"))
        .and(body_string_contains("code_verifier=verifier-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::code_grant_body()))
        .expect(1)
        .mount(&server)
        .await;

    let mut session = pending_session();
    let mut cookies = MemoryCookies::new();
    let before = Utc::now();

    let outcome = filter
        .handle(&callback("state-123", "code-1"), &mut session, &mut cookies)
        .await;

    assert_eq!(outcome, FilterOutcome::Redirect("/".to_string()));
    assert!(session.get(ACCESS_TOKEN_KEY).is_some());
    assert!(session.get(IDENTITY_TOKEN_KEY).is_some());
    assert!(session.get(STATE_KEY).is_none());
    assert!(session.get(CODE_VERIFIER_KEY).is_none());

    let expiry = chrono::DateTime::parse_from_rfc3339(
        &session.get(ACCESS_TOKEN_EXPIRATION_KEY).unwrap(),
    )
    .unwrap();
    assert!(expiry >= before + Duration::seconds(3599));

    let cookie = &cookies.outbound()[0];
    assert_eq!(cookie.name, REFRESH_TOKEN_COOKIE_NAME);
    assert_eq!(cookie.value, "refresh-1");
    assert_eq!(cookie.path, "/");
    assert_eq!(cookie.max_age, REFRESH_TOKEN_COOKIE_MAX_AGE);
    assert!(cookie.http_only && cookie.secure);
}

#[tokio::test]
async fn test_callback_with_wrong_state_is_denied_without_exchange() {
    let server = MockServer::start().await;
    let filter = filter_for(&server).await;

    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::code_grant_body()))
        .expect(0)
        .mount(&server)
        .await;

    let mut session = pending_session();
    let before = snapshot(&session);
    let mut cookies = MemoryCookies::new();

    let outcome = filter
        .handle(&callback("state-999", "code-1"), &mut session, &mut cookies)
        .await;

    assert_eq!(outcome, FilterOutcome::Deny);
    assert_eq!(snapshot(&session), before);
    assert!(cookies.outbound().is_empty());
}

#[tokio::test]
async fn test_callback_rejected_by_provider_is_denied() {
    let server = MockServer::start().await;
    let filter = filter_for(&server).await;
    mount_token_response(&server, 400, serde_json::json!({ "error": "invalid_grant" })).await;

    let mut session = pending_session();
    let before = snapshot(&session);
    let mut cookies = MemoryCookies::new();

    let outcome = filter
        .handle(&callback("state-123", "used-code"), &mut session, &mut cookies)
        .await;

    assert_eq!(outcome, FilterOutcome::Deny);
    assert_eq!(snapshot(&session), before);
    assert!(cookies.outbound().is_empty());
}

#[tokio::test]
async fn test_callback_with_provider_outage_is_denied() {
    let server = MockServer::start().await;
    let filter = filter_for(&server).await;
    mount_token_response(&server, 502, serde_json::json!({})).await;

    let mut session = pending_session();
    let outcome = filter
        .handle(&callback("state-123", "code"), &mut session, &mut MemoryCookies::new())
        .await;
    assert_eq!(outcome, FilterOutcome::Deny);
}

#[tokio::test]
async fn test_callback_with_forged_id_token_is_denied() {
    let server = MockServer::start().await;
    let filter = filter_for(&server).await;

    let mut body = common::code_grant_body();
    body["id_token"] = serde_json::json!(common::sign_with_kid(
        common::SIGNING_KEY_B,
        "key-a",
        &common::id_claims()
    ));
    mount_token_response(&server, 200, body).await;

    let mut session = pending_session();
    let before = snapshot(&session);
    let mut cookies = MemoryCookies::new();

    let outcome = filter
        .handle(&callback("state-123", "code"), &mut session, &mut cookies)
        .await;

    assert_eq!(outcome, FilterOutcome::Deny);
    assert_eq!(snapshot(&session), before);
    assert!(cookies.outbound().is_empty());
}

#[tokio::test]
async fn test_callback_with_foreign_audience_is_denied() {
    let server = MockServer::start().await;
    let filter = filter_for(&server).await;

    let mut claims = common::access_claims();
    claims["client_id"] = serde_json::json!("someone-else");
    let mut body = common::code_grant_body();
    body["access_token"] =
        serde_json::json!(common::sign_with_kid(common::SIGNING_KEY_A, "key-a", &claims));
    mount_token_response(&server, 200, body).await;

    let mut session = pending_session();
    let outcome = filter
        .handle(&callback("state-123", "code"), &mut session, &mut MemoryCookies::new())
        .await;

    assert_eq!(outcome, FilterOutcome::Deny);
    assert!(session.get(ACCESS_TOKEN_KEY).is_none());
}

// ---------------------------------------------------------------------------
// Session and refresh
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_expired_session_without_cookie_passes_through_unauthenticated() {
    let server = MockServer::start().await;
    let filter = filter_for(&server).await;

    let mut session = MemorySession::new("session-1");
    session.set(ACCESS_TOKEN_KEY, "old".to_string());
    session.set(
        ACCESS_TOKEN_EXPIRATION_KEY,
        (Utc::now() - Duration::seconds(1)).to_rfc3339(),
    );

    let outcome = filter
        .handle(&page(), &mut session, &mut MemoryCookies::new())
        .await;

    assert_eq!(outcome, FilterOutcome::Passthrough);
    assert_eq!(session.get(ACCESS_TOKEN_KEY).as_deref(), Some("old"));
}

#[tokio::test]
async fn test_expired_session_with_cookie_is_refreshed() {
    let server = MockServer::start().await;
    let filter = filter_for(&server).await;

    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=refresh-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::refresh_grant_body()))
        .expect(1)
        .mount(&server)
        .await;

    let mut session = MemorySession::new("session-1");
    session.set(ACCESS_TOKEN_KEY, "old".to_string());
    session.set(
        ACCESS_TOKEN_EXPIRATION_KEY,
        (Utc::now() - Duration::minutes(5)).to_rfc3339(),
    );
    let mut cookies = MemoryCookies::new().with_cookie(REFRESH_TOKEN_COOKIE_NAME, "refresh-1");

    let outcome = filter.handle(&page(), &mut session, &mut cookies).await;

    assert_eq!(outcome, FilterOutcome::Passthrough);
    assert_ne!(session.get(ACCESS_TOKEN_KEY).as_deref(), Some("old"));
    assert!(session.get(IDENTITY_TOKEN_KEY).is_some());
    let expiry = chrono::DateTime::parse_from_rfc3339(
        &session.get(ACCESS_TOKEN_EXPIRATION_KEY).unwrap(),
    )
    .unwrap();
    assert!(expiry > Utc::now());
    // The refresh grant returned no new refresh token.
    assert!(cookies.outbound().is_empty());
}

#[tokio::test]
async fn test_fresh_session_with_cookie_is_refreshed() {
    let server = MockServer::start().await;
    let filter = filter_for(&server).await;
    mount_token_response(&server, 200, common::refresh_grant_body()).await;

    let mut session = MemorySession::new("session-2");
    let mut cookies = MemoryCookies::new().with_cookie(REFRESH_TOKEN_COOKIE_NAME, "refresh-1");

    let outcome = filter.handle(&page(), &mut session, &mut cookies).await;

    assert_eq!(outcome, FilterOutcome::Passthrough);
    assert!(session.get(ACCESS_TOKEN_KEY).is_some());
}

#[tokio::test]
async fn test_stale_refresh_cookie_is_denied_and_expired() {
    let server = MockServer::start().await;
    let filter = filter_for(&server).await;
    mount_token_response(&server, 400, serde_json::json!({ "error": "invalid_grant" })).await;

    let mut session = MemorySession::new("session-1");
    let mut cookies = MemoryCookies::new().with_cookie(REFRESH_TOKEN_COOKIE_NAME, "revoked");

    let outcome = filter.handle(&page(), &mut session, &mut cookies).await;

    assert_eq!(outcome, FilterOutcome::Deny);
    assert!(session.is_empty());
    let cookie = &cookies.outbound()[0];
    assert_eq!(cookie.name, REFRESH_TOKEN_COOKIE_NAME);
    assert_eq!(cookie.max_age, 0);
}

#[tokio::test]
async fn test_refresh_with_other_provider_error_keeps_cookie() {
    let server = MockServer::start().await;
    let filter = filter_for(&server).await;
    mount_token_response(&server, 400, serde_json::json!({ "error": "invalid_client" })).await;

    let mut cookies = MemoryCookies::new().with_cookie(REFRESH_TOKEN_COOKIE_NAME, "r");
    let outcome = filter
        .handle(&page(), &mut MemorySession::new("s"), &mut cookies)
        .await;

    assert_eq!(outcome, FilterOutcome::Deny);
    assert!(cookies.outbound().is_empty());
}

#[tokio::test]
async fn test_refresh_with_forged_access_token_is_denied() {
    let server = MockServer::start().await;
    let filter = filter_for(&server).await;

    // Signed by key B but claiming to be key A.
    let forged = common::sign_with_kid(common::SIGNING_KEY_B, "key-a", &common::access_claims());
    mount_token_response(
        &server,
        200,
        serde_json::json!({
            "access_token": forged,
            "id_token": common::id_token(),
            "refresh_token": "rotated-1",
            "token_type": "Bearer",
            "expires_in": 3600,
        }),
    )
    .await;

    let mut session = MemorySession::new("session-1");
    session.set(ACCESS_TOKEN_KEY, "old".to_string());
    session.set(
        ACCESS_TOKEN_EXPIRATION_KEY,
        (Utc::now() - Duration::minutes(5)).to_rfc3339(),
    );
    let before = snapshot(&session);
    let mut cookies = MemoryCookies::new().with_cookie(REFRESH_TOKEN_COOKIE_NAME, "refresh-1");

    let outcome = filter.handle(&page(), &mut session, &mut cookies).await;

    assert_eq!(outcome, FilterOutcome::Deny);
    assert_eq!(snapshot(&session), before);
    assert!(cookies.outbound().is_empty());
}

#[tokio::test]
async fn test_no_session_no_cookie_passes_through() {
    let server = MockServer::start().await;
    let filter = filter_for(&server).await;

    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let mut session = MemorySession::new("anonymous");
    let mut cookies = MemoryCookies::new();
    let outcome = filter.handle(&page(), &mut session, &mut cookies).await;

    assert_eq!(outcome, FilterOutcome::Passthrough);
    assert!(session.is_empty());
    assert!(cookies.cookie(REFRESH_TOKEN_COOKIE_NAME).is_none());
}

// ---------------------------------------------------------------------------
// Key rotation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_unknown_kid_triggers_key_set_refetch() {
    let server = MockServer::start().await;

    // The first fetch only knows key-b; after rotation key-a is published.
    let mut initial = common::fixture_jwks();
    initial["keys"].as_array_mut().unwrap().remove(0);
    Mock::given(method("GET"))
        .and(path(common::JWKS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(initial))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(common::JWKS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::fixture_jwks()))
        .mount(&server)
        .await;
    mount_token_response(&server, 200, common::code_grant_body()).await;

    let mut config = mock_config(&server);
    config.filter.jwks_min_refresh_seconds = 0;
    let filter = AuthFilter::from_config(&config).await.unwrap();
    assert!(filter.key_set().snapshot().resolve("key-a").is_none());

    let mut session = pending_session();
    let outcome = filter
        .handle(&callback("state-123", "code"), &mut session, &mut MemoryCookies::new())
        .await;

    assert_eq!(outcome, FilterOutcome::Redirect("/".to_string()));
    assert!(filter.key_set().snapshot().resolve("key-a").is_some());
}

#[tokio::test]
async fn test_filter_does_not_start_without_keys() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(common::JWKS_PATH))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    assert!(AuthFilter::from_config(&mock_config(&server)).await.is_err());
}

#[tokio::test]
async fn test_begin_authorization_then_callback_round_trip() {
    let server = MockServer::start().await;
    let filter = filter_for(&server).await;

    let mut session = MemorySession::new("session-3");
    let url = filter.begin_authorization(&mut session).unwrap();
    let state = url
        .query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.into_owned())
        .unwrap();
    let verifier = session.get(CODE_VERIFIER_KEY).unwrap();
    let encoded: String = url::form_urlencoded::byte_serialize(verifier.as_bytes()).collect();

    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains(format!("code_verifier={encoded}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::code_grant_body()))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = filter
        .handle(&callback(&state, "code"), &mut session, &mut MemoryCookies::new())
        .await;
    assert_eq!(outcome, FilterOutcome::Redirect("/".to_string()));

    // The pending state is single-use.
    let replay = filter
        .handle(&callback(&state, "code"), &mut session, &mut MemoryCookies::new())
        .await;
    assert_eq!(replay, FilterOutcome::Deny);
}
