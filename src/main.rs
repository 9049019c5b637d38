//! Auth Gateway — centralized OAuth2/OIDC authentication gateway.

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use auth_gateway::{
    cli::{Cli, Command},
    config::Config,
    gateway::Gateway,
    keys::KeyPair,
    setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    match cli.command {
        Some(Command::Keygen { kid, bits }) => run_keygen(kid, bits),
        Some(Command::Serve) | None => run_server(cli).await,
    }
}

/// Generate a signing key pair and print the PEMs with a suggested kid.
fn run_keygen(kid: Option<String>, bits: usize) -> ExitCode {
    let kid = kid.unwrap_or_else(|| {
        let now = chrono::Utc::now();
        format!("auth-{}", now.format("%Y-%m"))
    });

    info!(kid = %kid, bits, "Generating RSA key pair");

    let private = match rsa::RsaPrivateKey::new(&mut rand::rngs::OsRng, bits) {
        Ok(key) => key,
        Err(e) => {
            error!("Key generation failed: {e}");
            return ExitCode::FAILURE;
        }
    };

    let (private_pem, public_pem) = match auth_gateway::keys::store::export_pem(&private) {
        Ok(pems) => pems,
        Err(e) => {
            error!("Key export failed: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Sanity check: the printed material must round-trip through the loader
    if let Err(e) = KeyPair::from_pem(&kid, &private_pem, &public_pem) {
        error!("Generated material failed validation: {e}");
        return ExitCode::FAILURE;
    }

    println!("# kid: {kid}");
    println!("# private key (keep secret):");
    println!("{private_pem}");
    println!("# public key:");
    println!("{public_pem}");

    ExitCode::SUCCESS
}

/// Run the gateway server
async fn run_server(cli: Cli) -> ExitCode {
    let config = match Config::load(cli.config.as_deref()) {
        Ok(mut config) => {
            // Apply CLI overrides
            if let Some(port) = cli.port {
                config.server.port = port;
            }
            if let Some(ref host) = cli.host {
                config.server.host = host.clone();
            }
            config
        }
        Err(e) => {
            error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.server.port,
        "Starting auth gateway"
    );

    let gateway = match Gateway::new(config) {
        Ok(g) => g,
        Err(e) => {
            error!("Failed to assemble gateway: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = gateway.run().await {
        error!("Gateway error: {e}");
        return ExitCode::FAILURE;
    }

    info!("Gateway shutdown complete");
    ExitCode::SUCCESS
}
