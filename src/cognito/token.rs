//! Backchannel grants against the user pool token endpoint
//!
//! [`TokenClient`] performs the two grants the filter needs:
//!
//! - authorization code exchange (`grant_type=authorization_code`), and
//! - refresh token exchange (`grant_type=refresh_token`).
//!
//! Both POST a form body to the token endpoint with HTTP Basic client
//! authentication.  The answer is classified strictly:
//!
//! | status | result |
//! |--------|--------|
//! | 200    | [`GrantOutcome::Granted`] with a complete [`UserPoolToken`] |
//! | 400    | [`GrantOutcome::Rejected`] with a known [`ProviderError`], or [`OAuthGateError::UnknownProviderError`] |
//! | other  | [`OAuthGateError::UnexpectedResponse`] |
//!
//! Network failures surface as [`OAuthGateError::Transport`].

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::cognito::endpoints::Endpoints;
use crate::config::ProviderSettings;
use crate::error::{OAuthGateError, Result};

// ---------------------------------------------------------------------------
// UserPoolToken
// ---------------------------------------------------------------------------

/// Tokens returned by a successful grant.
///
/// `Debug` output never includes token values.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPoolToken {
    /// Compact JWT authorizing API access.
    pub access_token: String,

    /// Compact JWT describing the authenticated user.
    pub id_token: String,

    /// Opaque long-lived token.  Only the authorization code grant returns
    /// one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Token type, `Bearer` for user pools.
    pub token_type: String,

    /// Lifetime of the access token in seconds from issuance.
    pub expires_in: u64,
}

impl fmt::Debug for UserPoolToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserPoolToken")
            .field("access_token", &"<redacted>")
            .field("id_token", &"<redacted>")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// ProviderError
// ---------------------------------------------------------------------------

/// The closed set of error codes the token endpoint answers `400` with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderError {
    InvalidRequest,
    InvalidClient,
    InvalidGrant,
    UnauthorizedClient,
    UnsupportedGrantType,
}

impl ProviderError {
    /// Maps the provider's `error` string by exact lowercase match.
    ///
    /// # Errors
    ///
    /// Returns [`OAuthGateError::UnknownProviderError`] for any other value,
    /// including differently cased spellings of a known code.
    ///
    /// # Examples
    ///
    /// ```
    /// use oauthgate::cognito::token::ProviderError;
    ///
    /// assert_eq!(
    ///     ProviderError::from_code("invalid_grant").unwrap(),
    ///     ProviderError::InvalidGrant
    /// );
    /// assert!(ProviderError::from_code("INVALID_GRANT").is_err());
    /// assert!(ProviderError::from_code("slow_down").is_err());
    /// ```
    pub fn from_code(code: &str) -> Result<Self> {
        match code {
            "invalid_request" => Ok(Self::InvalidRequest),
            "invalid_client" => Ok(Self::InvalidClient),
            "invalid_grant" => Ok(Self::InvalidGrant),
            "unauthorized_client" => Ok(Self::UnauthorizedClient),
            "unsupported_grant_type" => Ok(Self::UnsupportedGrantType),
            other => Err(OAuthGateError::UnknownProviderError(other.to_string()).into()),
        }
    }

    /// The wire spelling of this code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::InvalidClient => "invalid_client",
            Self::InvalidGrant => "invalid_grant",
            Self::UnauthorizedClient => "unauthorized_client",
            Self::UnsupportedGrantType => "unsupported_grant_type",
        }
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// GrantOutcome
// ---------------------------------------------------------------------------

/// Either the granted tokens or the classified reason the provider refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantOutcome {
    Granted(UserPoolToken),
    Rejected(ProviderError),
}

impl GrantOutcome {
    /// Returns `true` for [`GrantOutcome::Granted`].
    pub fn is_granted(&self) -> bool {
        matches!(self, GrantOutcome::Granted(_))
    }

    /// The granted tokens.
    ///
    /// # Panics
    ///
    /// Panics if the grant was rejected.
    pub fn token(&self) -> &UserPoolToken {
        match self {
            GrantOutcome::Granted(token) => token,
            GrantOutcome::Rejected(error) => {
                panic!("token() called on a rejected grant ({error})")
            }
        }
    }

    /// Consumes the outcome and returns the granted tokens.
    ///
    /// # Panics
    ///
    /// Panics if the grant was rejected.
    pub fn into_token(self) -> UserPoolToken {
        match self {
            GrantOutcome::Granted(token) => token,
            GrantOutcome::Rejected(error) => {
                panic!("into_token() called on a rejected grant ({error})")
            }
        }
    }

    /// The provider's reason for refusing.
    ///
    /// # Panics
    ///
    /// Panics if the grant succeeded.
    pub fn error(&self) -> ProviderError {
        match self {
            GrantOutcome::Rejected(error) => *error,
            GrantOutcome::Granted(_) => panic!("error() called on a granted outcome"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

// ---------------------------------------------------------------------------
// TokenClient
// ---------------------------------------------------------------------------

/// Client for the token endpoint.
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Clone)]
pub struct TokenClient {
    http: reqwest::Client,
    token_url: Url,
    client_id: String,
    redirect_uri: String,
    authorization: String,
}

impl TokenClient {
    /// Creates a client for the token endpoint in `endpoints`.
    ///
    /// The Basic credentials are computed here once.  Timeouts are whatever
    /// `http` was built with.
    pub fn new(http: reqwest::Client, settings: &ProviderSettings, endpoints: &Endpoints) -> Self {
        let credentials = format!("{}:{}", settings.client_id(), settings.client_secret());
        Self {
            http,
            token_url: endpoints.token().clone(),
            client_id: settings.client_id().to_string(),
            redirect_uri: settings.redirect_uri().to_string(),
            authorization: format!("Basic {}", STANDARD.encode(credentials.as_bytes())),
        }
    }

    /// Exchanges an authorization code and its PKCE verifier for tokens.
    ///
    /// # Errors
    ///
    /// See the module documentation for the classification of answers.
    pub async fn authorization_code_exchange(
        &self,
        code: &str,
        verifier: &str,
    ) -> Result<GrantOutcome> {
        let params = [
            ("grant_type", "authorization_code"),
            ("client_id", self.client_id.as_str()),
            ("code", code),
            ("code_verifier", verifier),
            ("redirect_uri", self.redirect_uri.as_str()),
        ];
        self.contact_token_endpoint(&params).await
    }

    /// Exchanges a refresh token for a fresh access and identity token.
    ///
    /// # Errors
    ///
    /// See the module documentation for the classification of answers.
    pub async fn refresh_token_exchange(&self, refresh_token: &str) -> Result<GrantOutcome> {
        let params = [
            ("grant_type", "refresh_token"),
            ("client_id", self.client_id.as_str()),
            ("refresh_token", refresh_token),
        ];
        self.contact_token_endpoint(&params).await
    }

    async fn contact_token_endpoint(&self, params: &[(&str, &str)]) -> Result<GrantOutcome> {
        let grant_type = params.first().map_or("", |(_, v)| *v);

        let resp = self
            .http
            .post(self.token_url.clone())
            .header(AUTHORIZATION, &self.authorization)
            .form(params)
            .send()
            .await
            .map_err(|e| OAuthGateError::Transport(format!("token request failed: {e}")))?;

        let status = resp.status();
        let body = resp
            .bytes()
            .await
            .map_err(|e| OAuthGateError::Transport(format!("token response interrupted: {e}")))?;

        tracing::debug!(grant_type, status = status.as_u16(), "Token endpoint answered");

        match status {
            StatusCode::OK => {
                let token: UserPoolToken = serde_json::from_slice(&body).map_err(|e| {
                    OAuthGateError::UnexpectedResponse(format!("incomplete token response: {e}"))
                })?;
                Ok(GrantOutcome::Granted(token))
            }
            StatusCode::BAD_REQUEST => {
                let body: ErrorBody = serde_json::from_slice(&body).map_err(|e| {
                    OAuthGateError::UnexpectedResponse(format!("malformed error response: {e}"))
                })?;
                let error = ProviderError::from_code(&body.error)?;
                tracing::warn!(grant_type, error = %error, "Token endpoint refused grant");
                Ok(GrantOutcome::Rejected(error))
            }
            other => Err(OAuthGateError::UnexpectedResponse(format!(
                "token endpoint returned {other}"
            ))
            .into()),
        }
    }
}

impl fmt::Debug for TokenClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenClient")
            .field("token_url", &self.token_url.as_str())
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}
