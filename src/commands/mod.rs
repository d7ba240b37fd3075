//! Command handlers for the CLI
//!
//! Each handler takes the loaded [`Config`] and does one thing:
//!
//! - [`check_config`] validates settings and prints the derived endpoints
//! - [`login_url`]    prints a fresh authorization URL with its pending values
//! - [`list_keys`]    fetches the user pool key set and lists its keys
//! - [`serve`]        runs the sample application behind the filter

use std::time::Duration;

use colored::Colorize;
use prettytable::{row, Table};

use crate::cognito::endpoints::Endpoints;
use crate::cognito::jwks::fetch_key_set;
use crate::config::Config;
use crate::error::Result;
use crate::filter::PendingAuthorization;
use crate::secure::SecurePrimitives;

/// Validates the configuration and prints the endpoints derived from it.
///
/// # Errors
///
/// Returns the first validation error, with every missing setting named.
///
/// # Examples
///
/// ```no_run
/// use oauthgate::commands::check_config;
/// use oauthgate::config::Config;
///
/// # fn example(config: Config) -> anyhow::Result<()> {
/// check_config(&config)?;
/// # Ok(())
/// # }
/// ```
pub fn check_config(config: &Config) -> Result<()> {
    let settings = config.validate()?;
    let endpoints = Endpoints::new(&settings, &config.endpoints)?;

    let mut table = Table::new();
    table.add_row(row!["Setting", "Value"]);
    table.add_row(row!["user_pool_id", settings.user_pool_id()]);
    table.add_row(row!["client_id", settings.client_id()]);
    table.add_row(row!["region", settings.region()]);
    table.add_row(row!["redirect_uri", settings.redirect_uri()]);
    table.add_row(row!["authorize", endpoints.authorize().as_str()]);
    table.add_row(row!["token", endpoints.token().as_str()]);
    table.add_row(row!["jwks", endpoints.jwks().as_str()]);
    table.add_row(row!["issuer", endpoints.issuer()]);
    table.add_row(row!["landing_path", config.filter.landing_path]);
    table.add_row(row!["validate_claims", config.filter.validate_claims]);
    table.printstd();

    println!("{}", "Configuration is valid".green());
    Ok(())
}

/// Prints a freshly generated authorization URL.
///
/// The `state` and code verifier are printed too so the resulting callback
/// can be completed by hand.  Nothing is stored.
///
/// # Errors
///
/// Returns configuration errors.
pub fn login_url(config: &Config) -> Result<()> {
    let settings = config.validate()?;
    let endpoints = Endpoints::new(&settings, &config.endpoints)?;
    let pending = PendingAuthorization::generate(&SecurePrimitives::new(), &settings, &endpoints)?;

    println!("{}", pending.url);
    println!();
    println!("{} {}", "state:".bold(), pending.state);
    println!("{} {}", "code_verifier:".bold(), pending.verifier);
    Ok(())
}

/// Fetches the user pool key set and prints one row per key.
///
/// # Errors
///
/// Returns configuration errors and key set fetch errors.
pub async fn list_keys(config: &Config) -> Result<()> {
    let settings = config.validate()?;
    let endpoints = Endpoints::new(&settings, &config.endpoints)?;
    let http = crate::cognito::http_client(Duration::from_secs(config.filter.http_timeout_seconds))?;

    tracing::info!(url = %endpoints.jwks(), "Fetching key set");
    let keys = fetch_key_set(&http, endpoints.jwks()).await?;

    if keys.is_empty() {
        println!("{}", "Key set is empty".yellow());
        return Ok(());
    }

    let mut table = Table::new();
    table.add_row(row!["kid", "alg", "kty", "use"]);
    for key in &keys.keys {
        table.add_row(row![key.kid, key.alg, key.kty, key.key_use]);
    }
    table.printstd();
    Ok(())
}

/// Serves the sample application on `bind`.
///
/// # Errors
///
/// See [`crate::web::serve`].
pub async fn serve(config: &Config, bind: &str) -> Result<()> {
    crate::web::serve(config, bind).await
}
