//! Session and cookie capabilities consumed by the filter
//!
//! The filter never talks to a web framework directly.  It reads and writes
//! per-caller state through two small traits:
//!
//! - [`Session`]: a key-value store scoped to one caller, whose lifecycle is
//!   owned by the host.
//! - [`CookieJar`]: read an inbound cookie by name, emit an outbound one.
//!
//! [`MemorySession`] and [`MemoryCookies`] are the in-process
//! implementations used by the axum adapter and the tests.

use std::collections::HashMap;
use std::fmt;

/// Session key of the current access token.
pub const ACCESS_TOKEN_KEY: &str = "oauthgate.access_token";

/// Session key of the access token's absolute expiry (RFC 3339).
pub const ACCESS_TOKEN_EXPIRATION_KEY: &str = "oauthgate.access_token.expiration";

/// Session key of the current identity token.
pub const IDENTITY_TOKEN_KEY: &str = "oauthgate.identity_token";

/// Session key of the pending anti-forgery `state`.
pub const STATE_KEY: &str = "oauthgate.state";

/// Session key of the pending PKCE code verifier.
pub const CODE_VERIFIER_KEY: &str = "oauthgate.code_verifier";

/// Name of the cookie holding the refresh token.
///
/// The `__Host-` prefix obliges browsers to require `Secure`, `Path=/` and
/// no `Domain` attribute.
pub const REFRESH_TOKEN_COOKIE_NAME: &str = "__Host-oauthgate_refresh_token";

/// Lifetime of the refresh token cookie, 30 days.
pub const REFRESH_TOKEN_COOKIE_MAX_AGE: i64 = 30 * 24 * 60 * 60;

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Key-value state scoped to one caller.
pub trait Session: Send {
    /// Identifier used in audit logs.
    fn id(&self) -> &str;

    fn get(&self, key: &str) -> Option<String>;

    fn set(&mut self, key: &str, value: String);

    fn remove(&mut self, key: &str);
}

/// Inbound cookie lookup and outbound cookie emission.
pub trait CookieJar: Send {
    /// Value of the inbound cookie `name`, if the caller sent one.
    fn cookie(&self, name: &str) -> Option<String>;

    /// Queues `cookie` to be sent with the response.
    fn set_cookie(&mut self, cookie: OutboundCookie);
}

// ---------------------------------------------------------------------------
// OutboundCookie
// ---------------------------------------------------------------------------

/// A cookie to be set on the response.
#[derive(Clone, PartialEq, Eq)]
pub struct OutboundCookie {
    pub name: String,
    pub value: String,
    pub path: String,
    /// Seconds until expiry; `0` deletes the cookie.
    pub max_age: i64,
    pub http_only: bool,
    pub secure: bool,
}

impl OutboundCookie {
    /// The refresh token cookie: whole path, HTTP-only, secure, 30 days.
    pub fn refresh_token(value: impl Into<String>) -> Self {
        Self {
            name: REFRESH_TOKEN_COOKIE_NAME.to_string(),
            value: value.into(),
            path: "/".to_string(),
            max_age: REFRESH_TOKEN_COOKIE_MAX_AGE,
            http_only: true,
            secure: true,
        }
    }

    /// A cookie that makes the client discard its refresh token.
    pub fn expired_refresh_token() -> Self {
        Self {
            max_age: 0,
            ..Self::refresh_token("")
        }
    }

    /// Renders the cookie as a `Set-Cookie` header value.
    ///
    /// # Examples
    ///
    /// ```
    /// use oauthgate::session::OutboundCookie;
    ///
    /// let cookie = OutboundCookie::refresh_token("abc");
    /// assert_eq!(
    ///     cookie.to_header_value(),
    ///     "__Host-oauthgate_refresh_token=abc; Path=/; Max-Age=2592000; HttpOnly; Secure"
    /// );
    /// ```
    pub fn to_header_value(&self) -> String {
        let mut header = format!(
            "{}={}; Path={}; Max-Age={}",
            self.name, self.value, self.path, self.max_age
        );
        if self.http_only {
            header.push_str("; HttpOnly");
        }
        if self.secure {
            header.push_str("; Secure");
        }
        header
    }
}

impl fmt::Debug for OutboundCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutboundCookie")
            .field("name", &self.name)
            .field("value", &"<redacted>")
            .field("path", &self.path)
            .field("max_age", &self.max_age)
            .field("http_only", &self.http_only)
            .field("secure", &self.secure)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// In-memory implementations
// ---------------------------------------------------------------------------

/// A session held in process memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySession {
    id: String,
    values: HashMap<String, String>,
}

impl MemorySession {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            values: HashMap::new(),
        }
    }

    /// Number of attributes currently stored.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Session for MemorySession {
    fn id(&self) -> &str {
        &self.id
    }

    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) {
        self.values.insert(key.to_string(), value);
    }

    fn remove(&mut self, key: &str) {
        self.values.remove(key);
    }
}

/// Inbound cookies of one request plus the cookies queued for its response.
#[derive(Debug, Clone, Default)]
pub struct MemoryCookies {
    inbound: HashMap<String, String>,
    outbound: Vec<OutboundCookie>,
}

impl MemoryCookies {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a `Cookie` request header (`a=1; b=2`).
    ///
    /// Pairs without `=` are ignored.  When a name repeats, the last value
    /// wins.
    pub fn from_header(header: &str) -> Self {
        let inbound = header
            .split(';')
            .filter_map(|pair| {
                let (name, value) = pair.trim().split_once('=')?;
                Some((name.trim().to_string(), value.trim().to_string()))
            })
            .collect();
        Self {
            inbound,
            outbound: Vec::new(),
        }
    }

    /// Adds an inbound cookie.
    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.inbound.insert(name.into(), value.into());
        self
    }

    /// Cookies queued for the response, in order.
    pub fn outbound(&self) -> &[OutboundCookie] {
        &self.outbound
    }

    pub fn into_outbound(self) -> Vec<OutboundCookie> {
        self.outbound
    }
}

impl CookieJar for MemoryCookies {
    fn cookie(&self, name: &str) -> Option<String> {
        self.inbound.get(name).cloned()
    }

    fn set_cookie(&mut self, cookie: OutboundCookie) {
        self.outbound.push(cookie);
    }
}
