//! JSON Web Key Set retrieval, lookup and caching
//!
//! The user pool publishes its signing keys at a well-known URL as
//! `{ "keys": [ JWK, ... ] }`.  Every key must carry `kid`, `alg`, `kty`,
//! `e`, `n` and `use`; a key set with an incomplete entry is rejected as a
//! whole rather than partially loaded.
//!
//! [`KeySetCache`] holds the fetched set for the lifetime of the filter.
//! Readers take an `Arc` snapshot, so a refetch swaps the whole set at once
//! and no reader ever observes a half-updated set.
//!
//! # References
//!
//! - RFC 7517 JSON Web Key <https://www.rfc-editor.org/rfc/rfc7517>

use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{OAuthGateError, Result};

// ---------------------------------------------------------------------------
// Jwk / JwkSet
// ---------------------------------------------------------------------------

/// A single RSA signing key as published by the user pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    /// Key identifier referenced by the `kid` header of a JWT.
    pub kid: String,

    /// Signature algorithm, `RS256` for user pools.
    pub alg: String,

    /// Key type, `RSA` for user pools.
    pub kty: String,

    /// Public exponent, base64url-encoded big-endian unsigned integer.
    pub e: String,

    /// Modulus, base64url-encoded big-endian unsigned integer.
    pub n: String,

    /// Intended use, `sig` for user pools.
    #[serde(rename = "use")]
    pub key_use: String,
}

/// An ordered collection of [`Jwk`]s.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwkSet {
    /// Keys in the order the provider listed them.
    pub keys: Vec<Jwk>,
}

impl JwkSet {
    /// Looks up a key by exact `kid` match.
    pub fn resolve(&self, kid: &str) -> Option<&Jwk> {
        resolve_key(&self.keys, kid)
    }

    /// Key identifiers in listing order.
    pub fn kids(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(|k| k.kid.as_str())
    }

    /// Number of keys in the set.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns `true` when the set holds no keys.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Linear lookup of `kid` in `keys`.
///
/// Absence is reported as `None`; it is up to the caller to decide whether
/// an unknown key is worth a refetch.
pub fn resolve_key<'a>(keys: &'a [Jwk], kid: &str) -> Option<&'a Jwk> {
    keys.iter().find(|jwk| jwk.kid == kid)
}

// ---------------------------------------------------------------------------
// Fetching
// ---------------------------------------------------------------------------

/// Fetches and parses the key set at `url`.
///
/// # Errors
///
/// - [`OAuthGateError::Transport`] when the request fails or the body is cut
///   short.
/// - [`OAuthGateError::UnexpectedResponse`] on a non-success status or a body
///   that is not a complete key set.
///
/// # Examples
///
/// ```no_run
/// use oauthgate::cognito::jwks::fetch_key_set;
///
/// # async fn example() -> oauthgate::error::Result<()> {
/// let http = reqwest::Client::new();
/// let url = url::Url::parse(
///     "https://cognito-idp.eu-central-1.amazonaws.com/eu-central-1_pool/.well-known/jwks.json",
/// )?;
/// let keys = fetch_key_set(&http, &url).await?;
/// for kid in keys.kids() {
///     println!("{kid}");
/// }
/// # Ok(())
/// # }
/// ```
pub async fn fetch_key_set(http: &reqwest::Client, url: &Url) -> Result<JwkSet> {
    let resp = http
        .get(url.clone())
        .send()
        .await
        .map_err(|e| OAuthGateError::Transport(format!("key set request failed: {e}")))?;

    let status = resp.status();
    if !status.is_success() {
        return Err(OAuthGateError::UnexpectedResponse(format!(
            "key set endpoint returned {status}"
        ))
        .into());
    }

    let body = resp
        .bytes()
        .await
        .map_err(|e| OAuthGateError::Transport(format!("key set body interrupted: {e}")))?;

    let set: JwkSet = serde_json::from_slice(&body).map_err(|e| {
        OAuthGateError::UnexpectedResponse(format!("malformed key set: {e}"))
    })?;

    Ok(set)
}

// ---------------------------------------------------------------------------
// KeySetCache
// ---------------------------------------------------------------------------

/// The key set held for the lifetime of a filter.
///
/// The set is loaded once with [`KeySetCache::load`].  A refetch happens
/// only when a caller asks for one through [`KeySetCache::refresh`], and at
/// most once per `min_refresh` interval; a failed refetch leaves the current
/// set in place.
pub struct KeySetCache {
    http: reqwest::Client,
    url: Url,
    current: RwLock<Arc<JwkSet>>,
    last_fetch: tokio::sync::Mutex<Instant>,
    min_refresh: Duration,
}

impl KeySetCache {
    /// Fetches the key set and wraps it in a cache.
    ///
    /// # Errors
    ///
    /// Propagates any error from [`fetch_key_set`]; a filter must not start
    /// without keys.
    pub async fn load(http: reqwest::Client, url: Url, min_refresh: Duration) -> Result<Self> {
        let set = fetch_key_set(&http, &url).await?;
        tracing::info!(url = %url, keys = set.len(), "Loaded key set");
        for kid in set.kids() {
            tracing::info!(kid = %kid, "Signing key available");
        }
        Ok(Self::with_key_set(http, url, set, min_refresh))
    }

    /// Wraps an already fetched key set.
    pub fn with_key_set(
        http: reqwest::Client,
        url: Url,
        set: JwkSet,
        min_refresh: Duration,
    ) -> Self {
        Self {
            http,
            url,
            current: RwLock::new(Arc::new(set)),
            last_fetch: tokio::sync::Mutex::new(Instant::now()),
            min_refresh,
        }
    }

    /// The current key set.
    pub fn snapshot(&self) -> Arc<JwkSet> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Refetches the key set unless the last fetch is more recent than the
    /// minimum refresh interval.
    ///
    /// Returns `true` when a new set was installed.  Concurrent callers are
    /// serialized; the second one sees the fresh timestamp and skips.
    ///
    /// # Errors
    ///
    /// Propagates fetch errors.  The previous set stays installed.
    pub async fn refresh(&self) -> Result<bool> {
        let mut last_fetch = self.last_fetch.lock().await;
        if last_fetch.elapsed() < self.min_refresh {
            tracing::debug!("Key set refresh skipped, last fetch too recent");
            return Ok(false);
        }

        // Count the attempt even if it fails so a dead endpoint is not
        // hammered on every unknown kid.
        *last_fetch = Instant::now();
        let set = fetch_key_set(&self.http, &self.url).await?;
        tracing::info!(keys = set.len(), "Refreshed key set");

        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Arc::new(set);
        Ok(true)
    }
}

impl std::fmt::Debug for KeySetCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeySetCache")
            .field("url", &self.url.as_str())
            .field("keys", &self.snapshot().len())
            .field("min_refresh", &self.min_refresh)
            .finish()
    }
}
