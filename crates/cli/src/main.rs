//! Depot CLI - Terminal storefront and maintenance tools.
//!
//! # Usage
//!
//! ```bash
//! # Browse, sign in and edit the cart against a running gateway
//! depot-cli shell
//!
//! # Create the gateway's session table
//! depot-cli migrate
//! ```
//!
//! # Commands
//!
//! - `shell` - Interactive storefront over `depot-client`
//! - `migrate` - Create or update the session store schema

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "depot-cli")]
#[command(author, version, about = "Depot storefront CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive storefront shell
    Shell {
        /// Gateway origin (overrides `DEPOT_API_URL`)
        #[arg(long)]
        api_url: Option<String>,
    },
    /// Run the session store migration
    Migrate,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "depot_client=warn,depot_cli=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Shell { api_url } => commands::shell::run(api_url.as_deref()).await?,
        Commands::Migrate => commands::migrate::sessions().await?,
    }
    Ok(())
}
