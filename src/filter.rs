//! Request classification and token acquisition
//!
//! [`AuthFilter::handle`] looks at every inbound request and takes the
//! first branch that applies:
//!
//! 1. **Callback**: the request URL equals the registered redirect URI.
//!    The `state` parameter must match the pending state in the session,
//!    the code is exchanged for tokens, both tokens are verified, and the
//!    caller is redirected to the landing path.
//! 2. **Valid session**: the session holds an access token whose stored
//!    expiry lies in the future.  The request passes through.
//! 3. **Refresh**: a refresh token cookie is present.  It is exchanged for
//!    a fresh access token, which is verified and stored before the request
//!    passes through.
//! 4. **Anything else** passes through unauthenticated.  Deciding whether
//!    an anonymous caller may see a resource is left to the application.
//!
//! Every failure on branches 1 and 3 becomes [`FilterOutcome::Deny`] and
//! leaves the session exactly as it was.  Tokens, codes and verifiers never
//! appear in log output.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use url::Url;

use crate::cognito::claims::{ClaimsPolicy, TokenUse};
use crate::cognito::endpoints::Endpoints;
use crate::cognito::jwks::KeySetCache;
use crate::cognito::jwt::{JwtVerifier, Verification};
use crate::cognito::token::{GrantOutcome, ProviderError, TokenClient, UserPoolToken};
use crate::config::{Config, FilterConfig, ProviderSettings};
use crate::error::Result;
use crate::pkce::PkcePair;
use crate::secure::SecurePrimitives;
use crate::session::{
    CookieJar, OutboundCookie, Session, ACCESS_TOKEN_EXPIRATION_KEY, ACCESS_TOKEN_KEY,
    CODE_VERIFIER_KEY, IDENTITY_TOKEN_KEY, REFRESH_TOKEN_COOKIE_NAME, STATE_KEY,
};

/// Number of random bits in a generated `state` value.
pub const STATE_BITS: i64 = 160;

// ---------------------------------------------------------------------------
// RequestInfo / FilterOutcome
// ---------------------------------------------------------------------------

/// The parts of an inbound request the filter looks at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestInfo {
    /// Absolute request URL without query string or fragment.
    pub url: String,
    /// Decoded query parameters.
    pub params: HashMap<String, String>,
}

impl RequestInfo {
    pub fn new(url: impl Into<String>, params: HashMap<String, String>) -> Self {
        Self {
            url: url.into(),
            params,
        }
    }

    /// Splits an absolute URL into the bare URL and its query parameters.
    ///
    /// # Examples
    ///
    /// ```
    /// use oauthgate::filter::RequestInfo;
    ///
    /// let url = url::Url::parse("https://app.example.com/oauth/callback?code=c&state=s").unwrap();
    /// let request = RequestInfo::from_url(&url);
    /// assert_eq!(request.url, "https://app.example.com/oauth/callback");
    /// assert_eq!(request.param("state"), Some("s"));
    /// ```
    pub fn from_url(url: &Url) -> Self {
        let params = url.query_pairs().into_owned().collect();
        let mut bare = url.clone();
        bare.set_query(None);
        bare.set_fragment(None);
        Self {
            url: bare.into(),
            params,
        }
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

/// What the host should do with the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterOutcome {
    /// Forward to the protected resource unchanged.
    Passthrough,
    /// Reject with an authentication failure (HTTP 401).
    Deny,
    /// Send the caller to this location (HTTP 302).
    Redirect(String),
}

/// A freshly started authorization: the values to keep until the callback
/// and the URL to send the caller to.
#[derive(Clone)]
pub struct PendingAuthorization {
    pub state: String,
    pub verifier: String,
    pub url: Url,
}

impl PendingAuthorization {
    /// Generates a `state` of [`STATE_BITS`] random bits and a PKCE pair,
    /// and builds the matching authorization URL.
    ///
    /// # Errors
    ///
    /// Fails only if the random generator rejects the requested size.
    pub fn generate(
        primitives: &SecurePrimitives,
        settings: &ProviderSettings,
        endpoints: &Endpoints,
    ) -> Result<Self> {
        let state = primitives.random_hex(STATE_BITS)?;
        let pkce = PkcePair::generate(primitives);
        let url = endpoints.authorization_url(settings, &state, &pkce.challenge);
        Ok(Self {
            state,
            verifier: pkce.verifier,
            url,
        })
    }
}

impl std::fmt::Debug for PendingAuthorization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingAuthorization")
            .field("state", &self.state)
            .field("verifier", &"<redacted>")
            .field("url", &self.url.as_str())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// AuthFilter
// ---------------------------------------------------------------------------

/// The authentication flow controller.
///
/// Holds only read-only configuration and shared clients, so one instance
/// serves any number of concurrent requests.
#[derive(Debug)]
pub struct AuthFilter {
    settings: ProviderSettings,
    endpoints: Endpoints,
    primitives: SecurePrimitives,
    tokens: TokenClient,
    verifier: JwtVerifier,
    keys: KeySetCache,
    claims: Option<ClaimsPolicy>,
    landing_path: String,
}

impl AuthFilter {
    /// Builds a filter from loaded configuration.
    ///
    /// Validates the configuration, derives the endpoints and fetches the
    /// key set.  A filter never starts without keys.
    ///
    /// # Errors
    ///
    /// Returns configuration errors from [`Config::validate`] and any error
    /// from the initial key set fetch.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let settings = config.validate()?;
        let endpoints = Endpoints::new(&settings, &config.endpoints)?;
        let http = crate::cognito::http_client(Duration::from_secs(
            config.filter.http_timeout_seconds,
        ))?;

        tracing::info!(
            user_pool_id = settings.user_pool_id(),
            region = settings.region(),
            client_id = settings.client_id(),
            "Starting authentication filter"
        );

        let keys = KeySetCache::load(
            http.clone(),
            endpoints.jwks().clone(),
            Duration::from_secs(config.filter.jwks_min_refresh_seconds),
        )
        .await?;
        let tokens = TokenClient::new(http, &settings, &endpoints);

        Ok(Self::new(
            settings,
            endpoints,
            tokens,
            keys,
            &config.filter,
            SecurePrimitives::new(),
        ))
    }

    /// Assembles a filter from already constructed parts.
    pub fn new(
        settings: ProviderSettings,
        endpoints: Endpoints,
        tokens: TokenClient,
        keys: KeySetCache,
        filter: &FilterConfig,
        primitives: SecurePrimitives,
    ) -> Self {
        let claims = filter.validate_claims.then(|| {
            ClaimsPolicy::new(
                endpoints.issuer(),
                settings.client_id(),
                chrono::Duration::seconds(
                    i64::try_from(filter.clock_skew_seconds).unwrap_or(i64::MAX),
                ),
            )
        });

        Self {
            settings,
            endpoints,
            primitives,
            tokens,
            verifier: JwtVerifier::new(primitives),
            keys,
            claims,
            landing_path: filter.landing_path.clone(),
        }
    }

    pub fn settings(&self) -> &ProviderSettings {
        &self.settings
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// The cached provider key set.
    pub fn key_set(&self) -> &KeySetCache {
        &self.keys
    }

    /// Starts an authorization: stores a fresh `state` and PKCE verifier in
    /// the session and returns the URL to send the caller to.
    ///
    /// Calling this again replaces any pending authorization.
    ///
    /// # Errors
    ///
    /// Fails only if the random generator rejects the requested size.
    pub fn begin_authorization(&self, session: &mut dyn Session) -> Result<Url> {
        let pending =
            PendingAuthorization::generate(&self.primitives, &self.settings, &self.endpoints)?;

        session.set(STATE_KEY, pending.state);
        session.set(CODE_VERIFIER_KEY, pending.verifier);

        tracing::info!(session_id = session.id(), "Authorization started");
        Ok(pending.url)
    }

    /// Classifies `request` and performs whatever grant it calls for.
    pub async fn handle(
        &self,
        request: &RequestInfo,
        session: &mut dyn Session,
        cookies: &mut dyn CookieJar,
    ) -> FilterOutcome {
        if self.is_redirection_uri(request) {
            self.authorization_code_exchange(request, session, cookies)
                .await
        } else if self.has_valid_access_token(session, Utc::now()) {
            FilterOutcome::Passthrough
        } else if let Some(refresh_token) = cookies.cookie(REFRESH_TOKEN_COOKIE_NAME) {
            self.refresh_token_grant(&refresh_token, session, cookies)
                .await
        } else {
            FilterOutcome::Passthrough
        }
    }

    fn is_redirection_uri(&self, request: &RequestInfo) -> bool {
        self.primitives
            .constant_time_eq(Some(&request.url), Some(self.settings.redirect_uri()))
    }

    fn has_valid_access_token(&self, session: &dyn Session, now: DateTime<Utc>) -> bool {
        if session.get(ACCESS_TOKEN_KEY).is_none() {
            return false;
        }
        match session
            .get(ACCESS_TOKEN_EXPIRATION_KEY)
            .as_deref()
            .map(DateTime::parse_from_rfc3339)
        {
            Some(Ok(expiry)) => now < expiry,
            Some(Err(e)) => {
                tracing::warn!(session_id = session.id(), error = %e, "Unreadable access token expiry");
                false
            }
            None => false,
        }
    }

    async fn authorization_code_exchange(
        &self,
        request: &RequestInfo,
        session: &mut dyn Session,
        cookies: &mut dyn CookieJar,
    ) -> FilterOutcome {
        let session_id = session.id().to_string();
        let saved_state = session.get(STATE_KEY);

        if saved_state.is_none()
            || !self
                .primitives
                .constant_time_eq(request.param("state"), saved_state.as_deref())
        {
            return deny(&session_id, "state mismatch");
        }

        let (Some(code), Some(verifier)) = (request.param("code"), session.get(CODE_VERIFIER_KEY))
        else {
            return deny(&session_id, "callback without code or pending verifier");
        };

        let token = match self.tokens.authorization_code_exchange(code, &verifier).await {
            Ok(GrantOutcome::Granted(token)) => token,
            Ok(GrantOutcome::Rejected(error)) => {
                tracing::warn!(
                    session_id = %session_id,
                    outcome = "denied",
                    error = %error,
                    "Authorization code exchange failed"
                );
                return FilterOutcome::Deny;
            }
            Err(e) => {
                tracing::error!(
                    session_id = %session_id,
                    outcome = "denied",
                    error = %e,
                    "Authorization code exchange errored"
                );
                return FilterOutcome::Deny;
            }
        };

        tracing::info!(
            session_id = %session_id,
            outcome = "success",
            expires_in = token.expires_in,
            "Authorization code exchange succeeded, new access token issued"
        );

        if !self.verify_token(&token.access_token, TokenUse::Access).await {
            return deny(&session_id, "failed to verify the access token");
        }
        if !self.verify_token(&token.id_token, TokenUse::Id).await {
            return deny(&session_id, "failed to verify the identity token");
        }

        let refresh_token = token.refresh_token.clone();
        store_tokens(session, &token, Utc::now());

        match refresh_token {
            Some(refresh_token) => cookies.set_cookie(OutboundCookie::refresh_token(refresh_token)),
            None => tracing::warn!(session_id = %session_id, "Grant returned no refresh token"),
        }

        session.remove(STATE_KEY);
        session.remove(CODE_VERIFIER_KEY);

        FilterOutcome::Redirect(self.landing_path.clone())
    }

    async fn refresh_token_grant(
        &self,
        refresh_token: &str,
        session: &mut dyn Session,
        cookies: &mut dyn CookieJar,
    ) -> FilterOutcome {
        let session_id = session.id().to_string();

        let token = match self.tokens.refresh_token_exchange(refresh_token).await {
            Ok(GrantOutcome::Granted(token)) => token,
            Ok(GrantOutcome::Rejected(error)) => {
                tracing::warn!(
                    session_id = %session_id,
                    outcome = "denied",
                    error = %error,
                    "Refresh token grant failed"
                );
                if error == ProviderError::InvalidGrant {
                    cookies.set_cookie(OutboundCookie::expired_refresh_token());
                }
                return FilterOutcome::Deny;
            }
            Err(e) => {
                tracing::error!(
                    session_id = %session_id,
                    outcome = "denied",
                    error = %e,
                    "Refresh token grant errored"
                );
                return FilterOutcome::Deny;
            }
        };

        tracing::info!(
            session_id = %session_id,
            outcome = "success",
            expires_in = token.expires_in,
            "Refresh token grant succeeded, new access token issued"
        );

        if !self.verify_token(&token.access_token, TokenUse::Access).await {
            return deny(&session_id, "refresh succeeded but the access token failed verification");
        }

        store_tokens(session, &token, Utc::now());
        if let Some(rotated) = token.refresh_token {
            cookies.set_cookie(OutboundCookie::refresh_token(rotated));
        }

        FilterOutcome::Passthrough
    }

    /// Signature check against the cached key set, then claim validation.
    ///
    /// An unknown `kid` triggers one rate-limited refetch of the key set.
    async fn verify_token(&self, token: &str, token_use: TokenUse) -> bool {
        let mut verdict = self.verifier.inspect(token, &self.keys.snapshot());

        if let Ok(Verification::UnknownKey(ref kid)) = verdict {
            match self.keys.refresh().await {
                Ok(true) => {
                    tracing::info!(kid = %kid, "Retrying verification with refreshed key set");
                    verdict = self.verifier.inspect(token, &self.keys.snapshot());
                }
                Ok(false) => {}
                Err(e) => tracing::warn!(error = %e, "Key set refresh failed"),
            }
        }

        match verdict {
            Ok(Verification::Valid) => {}
            Ok(other) => {
                tracing::warn!(token_use = token_use.as_str(), verdict = ?other, "Token rejected");
                return false;
            }
            Err(e) => {
                tracing::error!(token_use = token_use.as_str(), error = %e, "Token verification errored");
                return false;
            }
        }

        let Some(ref policy) = self.claims else {
            return true;
        };

        let claims: serde_json::Value = match self.verifier.payload(token) {
            Ok(claims) => claims,
            Err(e) => {
                tracing::warn!(token_use = token_use.as_str(), error = %e, "Unreadable token claims");
                return false;
            }
        };

        match policy.validate(&claims, token_use, Utc::now()) {
            Ok(()) => true,
            Err(rejection) => {
                tracing::warn!(
                    token_use = token_use.as_str(),
                    reason = %rejection,
                    "Token claims rejected"
                );
                false
            }
        }
    }
}

fn store_tokens(session: &mut dyn Session, token: &UserPoolToken, now: DateTime<Utc>) {
    let expiry = i64::try_from(token.expires_in)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .and_then(|expires_in| now.checked_add_signed(expires_in))
        .unwrap_or(now);

    session.set(ACCESS_TOKEN_KEY, token.access_token.clone());
    session.set(ACCESS_TOKEN_EXPIRATION_KEY, expiry.to_rfc3339());
    session.set(IDENTITY_TOKEN_KEY, token.id_token.clone());
}

fn deny(session_id: &str, message: &str) -> FilterOutcome {
    tracing::warn!(session_id = %session_id, outcome = "denied", "{}", message);
    FilterOutcome::Deny
}
