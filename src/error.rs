//! Error types for oauthgate
//!
//! This module defines all error types used throughout the crate,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for oauthgate operations
///
/// Classified provider errors (a `400` answer from the token endpoint with a
/// known `error` code) are *not* represented here; they travel as data inside
/// [`GrantOutcome`](crate::cognito::token::GrantOutcome).  Everything in this
/// enum is a failure of the operation itself.
#[derive(Error, Debug)]
pub enum OAuthGateError {
    /// One or more required settings are absent
    #[error("Missing required settings: [{}]", .0.join(", "))]
    MissingSettings(Vec<String>),

    /// A setting is present but its value is unusable
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network failure, interruption, or truncated body while talking to the
    /// key-set or token endpoint
    #[error("Transport error: {0}")]
    Transport(String),

    /// The provider answered with a status or body shape we do not handle
    #[error("Unexpected provider response: {0}")]
    UnexpectedResponse(String),

    /// A `400` from the token endpoint carried an `error` code outside the
    /// closed set of known provider errors
    #[error("Unrecognized provider error code: {0}")]
    UnknownProviderError(String),

    /// The signature primitive could not be used with the resolved key
    #[error("Cryptographic failure: {0}")]
    Crypto(String),

    /// Caller supplied an argument outside the accepted domain
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP client construction errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for oauthgate operations
///
/// Uses `anyhow::Error` so that context can be attached while propagating;
/// callers that need the category downcast to [`OAuthGateError`].
pub type Result<T> = anyhow::Result<T>;
