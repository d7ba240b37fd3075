//! Configuration management for oauthgate
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.
//!
//! The six provider settings are optional while the file is being merged;
//! [`ProviderConfig::settings`] turns them into the immutable
//! [`ProviderSettings`] record the core is built from, reporting every
//! missing name at once.

use crate::error::{OAuthGateError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure for oauthgate
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// User pool and app client settings
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Optional endpoint overrides
    #[serde(default)]
    pub endpoints: EndpointsConfig,

    /// Filter behavior
    #[serde(default)]
    pub filter: FilterConfig,
}

/// User pool and app client settings
///
/// Every field is required before the filter can be constructed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// User pool identifier, e.g. `eu-central-1_AbCdEfGhI`
    #[serde(default)]
    pub user_pool_id: Option<String>,

    /// App client identifier
    #[serde(default)]
    pub client_id: Option<String>,

    /// App client secret
    #[serde(default)]
    pub client_secret: Option<String>,

    /// Hosted UI domain prefix
    #[serde(default)]
    pub domain_prefix: Option<String>,

    /// AWS region of the user pool
    #[serde(default)]
    pub region: Option<String>,

    /// Exact redirect URI registered with the app client
    #[serde(default)]
    pub redirect_uri: Option<String>,
}

/// Optional endpoint overrides
///
/// When set, these replace the URLs derived from the provider settings.
/// Useful for tests and local mocks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndpointsConfig {
    /// Base of the hosted UI, replacing
    /// `https://<prefix>.auth.<region>.amazoncognito.com`
    #[serde(default)]
    pub auth_base_url: Option<String>,

    /// Full JWKS URL, replacing the well-known user pool key set location
    #[serde(default)]
    pub jwks_url: Option<String>,
}

/// Filter behavior configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Where the caller is sent after a successful callback
    #[serde(default = "default_landing_path")]
    pub landing_path: String,

    /// Timeout applied to every key-set and token endpoint call
    #[serde(default = "default_http_timeout_seconds")]
    pub http_timeout_seconds: u64,

    /// Check `iss`, `token_use`, audience and time claims after the signature
    #[serde(default = "default_validate_claims")]
    pub validate_claims: bool,

    /// Tolerance applied to `exp`, `nbf` and `iat`
    #[serde(default = "default_clock_skew_seconds")]
    pub clock_skew_seconds: u64,

    /// Minimum spacing between key-set refetches triggered by unknown `kid`s
    #[serde(default = "default_jwks_min_refresh_seconds")]
    pub jwks_min_refresh_seconds: u64,
}

fn default_landing_path() -> String {
    "/".to_string()
}

fn default_http_timeout_seconds() -> u64 {
    10
}

fn default_validate_claims() -> bool {
    true
}

fn default_clock_skew_seconds() -> u64 {
    60
}

fn default_jwks_min_refresh_seconds() -> u64 {
    300
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            landing_path: default_landing_path(),
            http_timeout_seconds: default_http_timeout_seconds(),
            validate_claims: default_validate_claims(),
            clock_skew_seconds: default_clock_skew_seconds(),
            jwks_min_refresh_seconds: default_jwks_min_refresh_seconds(),
        }
    }
}

// ---------------------------------------------------------------------------
// ProviderSettings
// ---------------------------------------------------------------------------

/// Validated, read-only provider settings shared by all requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSettings {
    user_pool_id: String,
    client_id: String,
    client_secret: String,
    domain_prefix: String,
    region: String,
    redirect_uri: String,
}

impl ProviderSettings {
    /// User pool identifier
    pub fn user_pool_id(&self) -> &str {
        &self.user_pool_id
    }

    /// App client identifier
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// App client secret
    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }

    /// Hosted UI domain prefix
    pub fn domain_prefix(&self) -> &str {
        &self.domain_prefix
    }

    /// AWS region
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Exact redirect URI
    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }
}

impl ProviderConfig {
    /// Builds the immutable settings record.
    ///
    /// An empty string counts as missing.
    ///
    /// # Errors
    ///
    /// Returns [`OAuthGateError::MissingSettings`] naming every absent field,
    /// not just the first.
    ///
    /// # Examples
    ///
    /// ```
    /// use oauthgate::config::ProviderConfig;
    /// use oauthgate::error::OAuthGateError;
    ///
    /// let config = ProviderConfig {
    ///     user_pool_id: Some("eu-central-1_pool".to_string()),
    ///     client_id: None,
    ///     client_secret: Some("secret".to_string()),
    ///     domain_prefix: Some("hello".to_string()),
    ///     region: None,
    ///     redirect_uri: Some("https://app.example.com/oauth/callback".to_string()),
    /// };
    ///
    /// let err = config.settings().unwrap_err();
    /// match err.downcast_ref::<OAuthGateError>() {
    ///     Some(OAuthGateError::MissingSettings(names)) => {
    ///         assert_eq!(names, &["client_id", "region"]);
    ///     }
    ///     other => panic!("unexpected error: {other:?}"),
    /// }
    /// ```
    pub fn settings(&self) -> Result<ProviderSettings> {
        let mut missing = Vec::new();
        let mut take = |name: &str, value: &Option<String>| -> String {
            match value.as_deref().map(str::trim) {
                Some(v) if !v.is_empty() => v.to_string(),
                _ => {
                    missing.push(name.to_string());
                    String::new()
                }
            }
        };

        let user_pool_id = take("user_pool_id", &self.user_pool_id);
        let client_id = take("client_id", &self.client_id);
        let client_secret = take("client_secret", &self.client_secret);
        let domain_prefix = take("domain_prefix", &self.domain_prefix);
        let region = take("region", &self.region);
        let redirect_uri = take("redirect_uri", &self.redirect_uri);

        if !missing.is_empty() {
            return Err(OAuthGateError::MissingSettings(missing).into());
        }

        Ok(ProviderSettings {
            user_pool_id,
            client_id,
            client_secret,
            domain_prefix,
            region,
            redirect_uri,
        })
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| OAuthGateError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| OAuthGateError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        let provider = &mut self.provider;
        let overrides: [(&str, &mut Option<String>); 6] = [
            ("OAUTHGATE_USER_POOL_ID", &mut provider.user_pool_id),
            ("OAUTHGATE_CLIENT_ID", &mut provider.client_id),
            ("OAUTHGATE_CLIENT_SECRET", &mut provider.client_secret),
            ("OAUTHGATE_DOMAIN_PREFIX", &mut provider.domain_prefix),
            ("OAUTHGATE_REGION", &mut provider.region),
            ("OAUTHGATE_REDIRECT_URI", &mut provider.redirect_uri),
        ];
        for (var, slot) in overrides {
            if let Ok(value) = std::env::var(var) {
                *slot = Some(value);
                tracing::debug!("Env override: {}", var);
            }
        }

        if let Ok(base) = std::env::var("OAUTHGATE_AUTH_BASE_URL") {
            self.endpoints.auth_base_url = Some(base);
            tracing::debug!("Env override: OAUTHGATE_AUTH_BASE_URL");
        }

        if let Ok(jwks) = std::env::var("OAUTHGATE_JWKS_URL") {
            self.endpoints.jwks_url = Some(jwks);
            tracing::debug!("Env override: OAUTHGATE_JWKS_URL");
        }

        if let Ok(landing) = std::env::var("OAUTHGATE_LANDING_PATH") {
            self.filter.landing_path = landing;
        }

        if let Ok(timeout) = std::env::var("OAUTHGATE_HTTP_TIMEOUT") {
            match timeout.parse::<u64>() {
                Ok(v) => {
                    self.filter.http_timeout_seconds = v;
                    tracing::debug!(http_timeout_seconds = v, "Env override: OAUTHGATE_HTTP_TIMEOUT");
                }
                Err(_) => {
                    tracing::warn!("Invalid value for OAUTHGATE_HTTP_TIMEOUT: {}", timeout);
                }
            }
        }

        if let Ok(validate) = std::env::var("OAUTHGATE_VALIDATE_CLAIMS") {
            match validate.parse::<bool>() {
                Ok(v) => self.filter.validate_claims = v,
                Err(_) => {
                    tracing::warn!("Invalid value for OAUTHGATE_VALIDATE_CLAIMS: {}", validate);
                }
            }
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if let Some(ref landing) = cli.landing_path {
            self.filter.landing_path = landing.clone();
        }
        if cli.verbose {
            tracing::debug!("Verbose mode enabled");
        }
    }

    /// Validate the configuration
    ///
    /// Checks presence of the provider settings (see
    /// [`ProviderConfig::settings`]) and the ranges of the remaining values.
    ///
    /// # Returns
    ///
    /// The validated [`ProviderSettings`].
    ///
    /// # Errors
    ///
    /// Returns error if any validation check fails
    pub fn validate(&self) -> Result<ProviderSettings> {
        let settings = self.provider.settings()?;

        let redirect_uri = url::Url::parse(settings.redirect_uri()).map_err(|_| {
            OAuthGateError::Config(format!(
                "redirect_uri is not an absolute URL: {}",
                settings.redirect_uri()
            ))
        })?;

        // Callbacks are matched against the request URL as the url crate
        // serializes it, without query or fragment.
        if redirect_uri.query().is_some() || redirect_uri.fragment().is_some() {
            return Err(OAuthGateError::Config(format!(
                "redirect_uri must not carry a query or fragment: {}",
                settings.redirect_uri()
            ))
            .into());
        }
        if redirect_uri.as_str() != settings.redirect_uri() {
            return Err(OAuthGateError::Config(format!(
                "redirect_uri is not in canonical form: {} (use {})",
                settings.redirect_uri(),
                redirect_uri
            ))
            .into());
        }

        if !self.filter.landing_path.starts_with('/') {
            return Err(
                OAuthGateError::Config("landing_path must start with '/'".to_string()).into(),
            );
        }

        if self.filter.http_timeout_seconds == 0 {
            return Err(OAuthGateError::Config(
                "http_timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        for (name, value) in [
            ("endpoints.auth_base_url", &self.endpoints.auth_base_url),
            ("endpoints.jwks_url", &self.endpoints.jwks_url),
        ] {
            if let Some(raw) = value {
                url::Url::parse(raw).map_err(|e| {
                    OAuthGateError::Config(format!("{name} is not a valid URL: {e}"))
                })?;
            }
        }

        Ok(settings)
    }
}
