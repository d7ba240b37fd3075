//! Standard-claim validation for user pool tokens
//!
//! Runs after [`JwtVerifier`](super::jwt::JwtVerifier) has accepted the
//! signature.  A user pool issues two kinds of JWT that differ in how they
//! name the audience:
//!
//! | token    | `token_use` | audience claim |
//! |----------|-------------|----------------|
//! | access   | `access`    | `client_id`    |
//! | identity | `id`        | `aud`          |
//!
//! Both must carry the pool's issuer, an `exp` in the future and, when
//! present, `nbf`/`iat` not in the future.  Time checks allow a configurable
//! clock skew.

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use thiserror::Error;

/// Which kind of user pool token is being validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenUse {
    Access,
    Id,
}

impl TokenUse {
    /// Value of the `token_use` claim for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenUse::Access => "access",
            TokenUse::Id => "id",
        }
    }

    fn audience_claim(&self) -> &'static str {
        match self {
            TokenUse::Access => "client_id",
            TokenUse::Id => "aud",
        }
    }
}

/// Why a token's claims were rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClaimsRejection {
    #[error("claims are not a JSON object")]
    NotAnObject,

    #[error("claim {0} is missing or has the wrong type")]
    Missing(&'static str),

    #[error("issuer {0} does not match the user pool")]
    WrongIssuer(String),

    #[error("token_use {found} where {expected} was expected")]
    WrongTokenUse {
        expected: &'static str,
        found: String,
    },

    #[error("token was issued to another client")]
    WrongAudience,

    #[error("token expired at {0}")]
    Expired(i64),

    #[error("token is not valid before {0}")]
    NotYetValid(i64),

    #[error("token was issued in the future at {0}")]
    IssuedInFuture(i64),
}

/// Expected claim values for one user pool and app client.
#[derive(Debug, Clone)]
pub struct ClaimsPolicy {
    issuer: String,
    client_id: String,
    skew: Duration,
}

impl ClaimsPolicy {
    /// Creates a policy for tokens from `issuer` addressed to `client_id`.
    pub fn new(issuer: impl Into<String>, client_id: impl Into<String>, skew: Duration) -> Self {
        Self {
            issuer: issuer.into(),
            client_id: client_id.into(),
            skew,
        }
    }

    /// Checks the decoded payload of a token of kind `token_use` at `now`.
    ///
    /// # Errors
    ///
    /// Returns the first [`ClaimsRejection`] found, checking issuer, token
    /// use, audience and then time claims.
    ///
    /// # Examples
    ///
    /// ```
    /// use chrono::{Duration, TimeZone, Utc};
    /// use oauthgate::cognito::claims::{ClaimsPolicy, TokenUse};
    ///
    /// let policy = ClaimsPolicy::new("https://issuer", "client", Duration::seconds(60));
    /// let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
    /// let claims = serde_json::json!({
    ///     "iss": "https://issuer",
    ///     "token_use": "access",
    ///     "client_id": "client",
    ///     "exp": 1_700_000_600,
    /// });
    /// assert!(policy.validate(&claims, TokenUse::Access, now).is_ok());
    /// ```
    pub fn validate(
        &self,
        claims: &Value,
        token_use: TokenUse,
        now: DateTime<Utc>,
    ) -> std::result::Result<(), ClaimsRejection> {
        let claims = claims.as_object().ok_or(ClaimsRejection::NotAnObject)?;

        let iss = claims
            .get("iss")
            .and_then(Value::as_str)
            .ok_or(ClaimsRejection::Missing("iss"))?;
        if iss != self.issuer {
            return Err(ClaimsRejection::WrongIssuer(iss.to_string()));
        }

        let found = claims
            .get("token_use")
            .and_then(Value::as_str)
            .ok_or(ClaimsRejection::Missing("token_use"))?;
        if found != token_use.as_str() {
            return Err(ClaimsRejection::WrongTokenUse {
                expected: token_use.as_str(),
                found: found.to_string(),
            });
        }

        let audience = token_use.audience_claim();
        let addressed_to_us = match claims.get(audience) {
            Some(Value::String(aud)) => *aud == self.client_id,
            Some(Value::Array(auds)) => auds
                .iter()
                .any(|a| a.as_str() == Some(self.client_id.as_str())),
            _ => return Err(ClaimsRejection::Missing(audience)),
        };
        if !addressed_to_us {
            return Err(ClaimsRejection::WrongAudience);
        }

        let skew = self.skew.num_seconds();
        let now = now.timestamp();

        let exp = claims
            .get("exp")
            .and_then(Value::as_i64)
            .ok_or(ClaimsRejection::Missing("exp"))?;
        if exp.saturating_add(skew) <= now {
            return Err(ClaimsRejection::Expired(exp));
        }

        if let Some(nbf) = claims.get("nbf").and_then(Value::as_i64) {
            if nbf.saturating_sub(skew) > now {
                return Err(ClaimsRejection::NotYetValid(nbf));
            }
        }

        if let Some(iat) = claims.get("iat").and_then(Value::as_i64) {
            if iat.saturating_sub(skew) > now {
                return Err(ClaimsRejection::IssuedInFuture(iat));
            }
        }

        Ok(())
    }
}
