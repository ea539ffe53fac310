use anyhow::Result;
use clap::{Parser, Subcommand};
use dumpvault::config::ObservabilityConfig;
use dumpvault::Config;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "dumpvault")]
#[command(about = "dumpvault - encrypted database dump and restore")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, env = "DUMPVAULT_CONFIG", default_value = "dumpvault.toml")]
    config: PathBuf,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Dump the database and store it encrypted
    Export,

    /// Decrypt a stored backup and restore it into the database
    Import {
        /// Encrypted artifact in the backup directory
        file: PathBuf,
    },

    /// List encrypted backups, newest first
    List,

    /// Generate a random 256-bit encryption key
    Keygen {
        /// Print base64 instead of hex
        #[arg(long)]
        base64: bool,
    },
}

fn init_tracing(config: &ObservabilityConfig) {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone());
    let registry = tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::new(filter));

    let format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| config.log_format.clone());
    if format.eq_ignore_ascii_case("json") {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

/// Load the config and install logging; every subcommand except `keygen` needs both.
fn load_config(path: &Path) -> Result<Config> {
    let (config, source) = Config::load_or_default(path)?;
    init_tracing(&config.observability);
    tracing::debug!("Using {}", source);
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Export => commands::run_export(load_config(&cli.config)?, cli.json).await,
        Commands::Import { file } => {
            commands::run_import(load_config(&cli.config)?, &file, cli.json).await
        }
        Commands::List => commands::run_list(&load_config(&cli.config)?, cli.json).await,
        Commands::Keygen { base64 } => commands::run_keygen(base64),
    }
}
