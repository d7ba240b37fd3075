//! oauthgate - OAuth 2.0 authorization code flow with PKCE for Cognito
//!
#![doc = "oauthgate - OAuth 2.0 authorization code flow with PKCE for Cognito"]
#![doc = "Main entry point for the oauthgate command-line tool."]

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use oauthgate::cli::{Cli, Commands};
use oauthgate::commands;
use oauthgate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Initialize tracing
    init_tracing(cli.verbose, cli.json_logs);

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;

    match cli.command {
        Commands::Serve { bind } => {
            tracing::info!("Starting sample application on {}", bind);
            commands::serve(&config, &bind).await
        }
        Commands::LoginUrl => commands::login_url(&config),
        Commands::Keys => commands::list_keys(&config).await,
        Commands::CheckConfig => commands::check_config(&config),
    }
}

/// Initialize tracing subscriber with environment filter
fn init_tracing(verbose: bool, json: bool) {
    let default_directive = if verbose {
        "oauthgate=debug"
    } else {
        "oauthgate=info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
