//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Centralized authentication gateway — OAuth2/OIDC logins to short-lived
/// RS256 session tokens
#[derive(Parser, Debug)]
#[command(name = "auth-gateway")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "AUTH_GATEWAY_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "AUTH_GATEWAY_PORT")]
    pub port: Option<u16>,

    /// Host to bind to
    #[arg(long, env = "AUTH_GATEWAY_HOST")]
    pub host: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "info",
        env = "AUTH_GATEWAY_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "AUTH_GATEWAY_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the gateway server (default)
    Serve,

    /// Generate a fresh RSA signing key pair and print the PEMs
    Keygen {
        /// Key id to suggest (defaults to auth-<year>-<month>)
        #[arg(long)]
        kid: Option<String>,

        /// RSA key size in bits
        #[arg(long, default_value_t = 4096)]
        bits: usize,
    },
}
