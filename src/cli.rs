//! Command-line interface definition for oauthgate
//!
//! This module defines the CLI structure using clap's derive API.

use clap::{Parser, Subcommand};

/// oauthgate - OAuth 2.0 authorization code flow with PKCE for Cognito
/// user pools
#[derive(Parser, Debug, Clone)]
#[command(name = "oauthgate")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,

    /// Override the post-login landing path
    #[arg(long, env = "OAUTHGATE_LANDING_PATH")]
    pub landing_path: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for oauthgate
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Serve a sample protected application behind the filter
    Serve {
        /// Address to bind
        #[arg(short, long, default_value = "127.0.0.1:8080")]
        bind: String,
    },

    /// Print a fresh authorization URL with its pending state and verifier
    LoginUrl,

    /// Fetch the user pool key set and list its key ids
    Keys,

    /// Validate the configuration and print the derived endpoints
    CheckConfig,
}

impl Cli {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
