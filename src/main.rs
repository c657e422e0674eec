use std::process;

use clap::Parser;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

use square_model_client::cli::{credentials_for, execute, resolve_config, Cli};
use square_model_client::ModelClient;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    // Load .env file if specified
    if let Some(ref env_file) = cli.env_file {
        if let Err(e) = dotenvy::from_path(env_file) {
            error!("Failed to load env file {}: {}", env_file.display(), e);
            process::exit(1);
        }
    }

    let config = match resolve_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    };
    debug!("Using model API at {}", config.base_url());

    let client = match ModelClient::new(config, credentials_for(&cli)) {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to create client: {}", e);
            process::exit(1);
        }
    };

    match execute(&client, &cli.command).await {
        Ok(output) => print!("{}", output),
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    }
}
