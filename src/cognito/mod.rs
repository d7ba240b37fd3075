//! Amazon Cognito user pool integration
//!
//! This module holds everything that talks to, or interprets data from, the
//! identity provider.
//!
//! # Module Layout
//!
//! - [`endpoints`] -- endpoint derivation and the authorization URL builder
//! - [`jwks`]      -- JSON Web Key Set retrieval, lookup and caching
//! - [`jwt`]       -- RS256 compact JWT signature verification
//! - [`claims`]    -- issuer, audience, token use and time claim checks
//! - [`token`]     -- backchannel authorization-code and refresh-token grants

pub mod claims;
pub mod endpoints;
pub mod jwks;
pub mod jwt;
pub mod token;

use std::time::Duration;

use crate::error::Result;

/// Builds the HTTP client shared by the key-set fetcher and the token
/// client.  Every call made with it is bounded by `timeout`.
///
/// # Errors
///
/// Returns an error if the TLS backend cannot be initialised.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .user_agent(concat!("oauthgate/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(crate::error::OAuthGateError::from)?;
    Ok(client)
}
