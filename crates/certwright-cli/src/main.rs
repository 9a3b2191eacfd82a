//! certwright - 証明書の発行・配信・削除を行う CLI

use std::path::PathBuf;

use anyhow::{Context, Result};
use certwright_core::app::{App, AppBuilder, Config};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod commands;

/// Caller tag recorded in audit events for CLI-driven actions.
pub(crate) const CALLER: &str = "CLI";

/// certwright - on-demand certificate issuing
#[derive(Parser)]
#[command(name = "certwright")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML config file (defaults apply when unset)
    #[arg(long, env = "CERTWRIGHT_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Force-generate certificates for one id or a range (e.g. ST001-ST010)
    GenerateCert {
        #[arg(long)]
        id: String,
    },
    /// Run one eviction cycle
    Cleanup {
        /// Keep artifacts referenced within this many days
        #[arg(long, default_value_t = 10)]
        days: u32,
    },
    /// Look a person up, wait for their certificate and save it
    Fetch {
        /// Identifier, name or national id
        #[arg(long)]
        term: String,
        #[arg(long)]
        out: PathBuf,
    },
    /// Run the background jobs until Ctrl-C
    Run,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let mut config = Config::load_or_default(cli.config.as_deref())
        .await
        .context("failed to load configuration")?;

    match cli.command {
        Commands::GenerateCert { id } => {
            let app = build(config).await?;
            commands::generate::run(&app, &id).await?;
        }
        Commands::Cleanup { days } => {
            config.retention.window_days = days;
            let app = build(config).await?;
            commands::cleanup::run(&app).await?;
        }
        Commands::Fetch { term, out } => {
            let app = build(config).await?;
            commands::fetch::run(&app, &term, &out).await?;
        }
        Commands::Run => {
            let app = build(config).await?;
            commands::serve::run(&app).await?;
        }
    }

    Ok(())
}

async fn build(config: Config) -> Result<App> {
    AppBuilder::new(config)
        .build()
        .await
        .context("failed to initialise certwright")
}
