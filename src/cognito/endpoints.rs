//! Provider endpoint derivation and the authorization request builder
//!
//! All URLs are derived once from [`ProviderSettings`] when the filter is
//! built:
//!
//! ```text
//! authorize  https://<prefix>.auth.<region>.amazoncognito.com/oauth2/authorize
//! token      https://<prefix>.auth.<region>.amazoncognito.com/oauth2/token
//! jwks       https://cognito-idp.<region>.amazonaws.com/<pool>/.well-known/jwks.json
//! issuer     https://cognito-idp.<region>.amazonaws.com/<pool>
//! ```
//!
//! The hosted UI base and the JWKS URL can be overridden through
//! [`EndpointsConfig`] so tests can point the filter at a mock server.

use url::Url;

use crate::config::{EndpointsConfig, ProviderSettings};
use crate::error::{OAuthGateError, Result};
use crate::pkce::CODE_CHALLENGE_METHOD;

/// Domain of the hosted UI (authorization and token endpoints).
pub const HOSTED_UI_DOMAIN: &str = "amazoncognito.com";

/// Domain of the user pool identity provider (issuer and key set).
pub const IDP_DOMAIN: &str = "amazonaws.com";

// ---------------------------------------------------------------------------
// Endpoints
// ---------------------------------------------------------------------------

/// The provider URLs used by one filter instance.
#[derive(Debug, Clone)]
pub struct Endpoints {
    authorize: Url,
    token: Url,
    jwks: Url,
    issuer: String,
}

impl Endpoints {
    /// Derives the endpoints from `settings`, applying any overrides.
    ///
    /// # Errors
    ///
    /// Returns [`OAuthGateError::Config`] when a derived or overridden URL
    /// does not parse (for example a domain prefix containing spaces).
    ///
    /// # Examples
    ///
    /// ```
    /// use oauthgate::cognito::endpoints::Endpoints;
    /// use oauthgate::config::{EndpointsConfig, ProviderConfig};
    ///
    /// let settings = ProviderConfig {
    ///     user_pool_id: Some("eu-central-1_pool".to_string()),
    ///     client_id: Some("client".to_string()),
    ///     client_secret: Some("secret".to_string()),
    ///     domain_prefix: Some("hello".to_string()),
    ///     region: Some("eu-central-1".to_string()),
    ///     redirect_uri: Some("https://app.example.com/oauth/callback".to_string()),
    /// }
    /// .settings()
    /// .unwrap();
    ///
    /// let endpoints = Endpoints::new(&settings, &EndpointsConfig::default()).unwrap();
    /// assert_eq!(
    ///     endpoints.token().as_str(),
    ///     "https://hello.auth.eu-central-1.amazoncognito.com/oauth2/token"
    /// );
    /// assert_eq!(
    ///     endpoints.issuer(),
    ///     "https://cognito-idp.eu-central-1.amazonaws.com/eu-central-1_pool"
    /// );
    /// ```
    pub fn new(settings: &ProviderSettings, overrides: &EndpointsConfig) -> Result<Self> {
        let hosted_ui = match overrides.auth_base_url {
            Some(ref base) => base.trim_end_matches('/').to_string(),
            None => format!(
                "https://{}.auth.{}.{}",
                settings.domain_prefix(),
                settings.region(),
                HOSTED_UI_DOMAIN
            ),
        };

        let issuer = format!(
            "https://cognito-idp.{}.{}/{}",
            settings.region(),
            IDP_DOMAIN,
            settings.user_pool_id()
        );

        let jwks = match overrides.jwks_url {
            Some(ref url) => url.clone(),
            None => format!("{issuer}/.well-known/jwks.json"),
        };

        Ok(Self {
            authorize: parse_endpoint("authorization", &format!("{hosted_ui}/oauth2/authorize"))?,
            token: parse_endpoint("token", &format!("{hosted_ui}/oauth2/token"))?,
            jwks: parse_endpoint("jwks", &jwks)?,
            issuer,
        })
    }

    /// Authorization endpoint (browser redirect target).
    pub fn authorize(&self) -> &Url {
        &self.authorize
    }

    /// Token endpoint (backchannel).
    pub fn token(&self) -> &Url {
        &self.token
    }

    /// Well-known key set location.
    pub fn jwks(&self) -> &Url {
        &self.jwks
    }

    /// Expected `iss` claim of every token issued by the user pool.
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Builds the authorization URL for a pending authorization.
    ///
    /// Parameters appear in the fixed order `response_type`, `client_id`,
    /// `redirect_uri`, `state`, `code_challenge`, `code_challenge_method`,
    /// each value form-urlencoded.
    pub fn authorization_url(
        &self,
        settings: &ProviderSettings,
        state: &str,
        code_challenge: &str,
    ) -> Url {
        let mut url = self.authorize.clone();
        url.query_pairs_mut()
            .clear()
            .append_pair("response_type", "code")
            .append_pair("client_id", settings.client_id())
            .append_pair("redirect_uri", settings.redirect_uri())
            .append_pair("state", state)
            .append_pair("code_challenge", code_challenge)
            .append_pair("code_challenge_method", CODE_CHALLENGE_METHOD);
        url
    }
}

fn parse_endpoint(name: &str, raw: &str) -> Result<Url> {
    Url::parse(raw)
        .map_err(|e| OAuthGateError::Config(format!("invalid {name} endpoint {raw}: {e}")).into())
}
