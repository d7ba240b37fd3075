//! oauthgate - OAuth 2.0 authorization code flow with PKCE for Amazon
//! Cognito user pools
//!
//! This library implements the confidential-client side of the
//! authorization code flow as a request filter: it starts authorizations,
//! completes callbacks over the backchannel, verifies the returned RS256
//! tokens against the user pool's key set, and refreshes expired sessions
//! from a refresh token cookie.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `secure`: constant-time comparison, secure randomness, base64url, SHA-256
//! - `pkce`: code verifier and `S256` challenge generation
//! - `cognito`: endpoints, key set, JWT verification, claims, token grants
//! - `session`: session and cookie capabilities consumed by the filter
//! - `filter`: the per-request state machine
//! - `web`: axum host for the filter
//! - `config`: configuration management and validation
//! - `error`: error types and result aliases
//! - `cli`: command-line interface definition
//! - `commands`: subcommand handlers for the binary
//!
//! # Example
//!
//! ```no_run
//! use oauthgate::filter::{AuthFilter, FilterOutcome, RequestInfo};
//! use oauthgate::session::{MemoryCookies, MemorySession};
//! use oauthgate::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config: Config = serde_yaml::from_str(&std::fs::read_to_string("config.yaml")?)?;
//!     let filter = AuthFilter::from_config(&config).await?;
//!
//!     let mut session = MemorySession::new("session-1");
//!     let mut cookies = MemoryCookies::new();
//!     let request = RequestInfo::from_url(&"https://app.example.com/".parse()?);
//!
//!     match filter.handle(&request, &mut session, &mut cookies).await {
//!         FilterOutcome::Passthrough => println!("forward"),
//!         FilterOutcome::Deny => println!("401"),
//!         FilterOutcome::Redirect(to) => println!("302 {to}"),
//!     }
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod cognito;
pub mod commands;
pub mod config;
pub mod error;
pub mod filter;
pub mod pkce;
pub mod secure;
pub mod session;
pub mod web;

// Re-export commonly used types
pub use config::Config;
pub use error::{OAuthGateError, Result};
pub use filter::{AuthFilter, FilterOutcome, RequestInfo};
pub use secure::SecurePrimitives;

#[cfg(test)]
pub mod test_utils;
