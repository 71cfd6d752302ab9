//! PrivID command-line client.
//!
//! Runs encrypted-attribute sessions against an in-process devnet and
//! manages the local decryption-grant cache.

mod commands;
mod config;
mod interactive;
mod keys;
mod output;
mod runtime;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{CliConfig, CliOverrides};

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

/// PrivID: private identity attributes over encrypted computation.
#[derive(Parser)]
#[command(name = "privid", version, about)]
struct Cli {
    /// Output in JSON format (no colors, machine-readable).
    #[arg(long, global = true)]
    json: bool,

    /// JSON config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory for keys and the grant store.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Chain id the devnet runs on.
    #[arg(long, global = true)]
    chain_id: Option<u64>,

    /// Validity of newly signed decryption grants, in days.
    #[arg(long, global = true)]
    grant_days: Option<u32>,

    /// Transaction confirmation timeout in seconds (0 waits forever).
    #[arg(long, global = true)]
    confirmation_timeout: Option<u64>,

    /// Deployment table JSON mapping chain ids to contract addresses.
    #[arg(long, global = true)]
    deployments: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the end-to-end scenario against a fresh devnet.
    Demo(commands::demo::DemoArgs),
    /// Interactive session (REPL).
    Interactive,
    /// Manage cached decryption grants.
    Grants {
        #[command(subcommand)]
        action: commands::grants::GrantsAction,
    },
    /// Inspect configuration.
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

// ---------------------------------------------------------------------------
// Global options passed to every command handler
// ---------------------------------------------------------------------------

/// Shared options threaded into command handlers.
pub struct GlobalOpts {
    pub json: bool,
    pub config: CliConfig,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let json = cli.json;

    let overrides = CliOverrides {
        data_dir: cli.data_dir,
        chain_id: cli.chain_id,
        grant_duration_days: cli.grant_days,
        confirmation_timeout_secs: cli.confirmation_timeout,
        deployments: cli.deployments,
    };
    let config = match CliConfig::resolve(cli.config.as_deref(), &overrides) {
        Ok(config) => config,
        Err(e) => {
            output::print_error(&e, json);
            std::process::exit(1);
        }
    };

    let opts = GlobalOpts { json, config };
    if let Err(e) = dispatch(opts, cli.command).await {
        output::print_error(&e, json);
        std::process::exit(1);
    }
}

async fn dispatch(opts: GlobalOpts, cmd: Commands) -> std::result::Result<(), String> {
    match cmd {
        Commands::Demo(args) => commands::demo::run(args, &opts).await,
        Commands::Interactive => interactive::run(&opts).await,
        Commands::Grants { action } => commands::grants::run(action, &opts).await,
        Commands::Config { action } => commands::config::run(action, &opts).await,
    }
}
