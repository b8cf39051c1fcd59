//! # fsa CLI
//!
//! Administrative command line for the FSAssets asset store.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fsa_config::logging::{init_logging, LogLevel};
use fsa_config::{log_cli_debug, Config};
use fsa_service::AssetStoreService;

mod admin;
mod config_cmd;
mod import;
mod serve;

/// FSAssets - content-addressed asset store
#[derive(Parser)]
#[command(name = "fsa")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Explicit config file (skips the global/project lookup)
    #[arg(long, global = true, env = "FSA_CONFIG")]
    config: Option<PathBuf>,

    /// Override storage.base_dir
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,

    /// Log level used when FSA_LOG and RUST_LOG are unset
    #[arg(long, global = true, default_value = "warn")]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Number of indexed assets
    Count,

    /// Show an asset's record, reference count and blob state
    Show {
        #[arg(value_name = "ID")]
        id: String,
    },

    /// Remove an asset's index record (the blob is kept)
    Delete {
        #[arg(value_name = "ID")]
        id: String,
    },

    /// Import legacy rows from <DIR>/<TABLE>.jsonl
    Import(import::ImportArgs),

    /// Store a file as a new asset and print its ID
    Put(admin::PutArgs),

    /// Write an asset's data to stdout or a file
    Get {
        #[arg(value_name = "ID")]
        id: String,

        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run one compaction pass now
    Compact,

    /// Blob store statistics
    Stats {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Run the store with background compaction until interrupted
    Serve,

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: config_cmd::ConfigCommands,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level);

    if let Commands::Config { command } = &cli.command {
        return config_cmd::run(command, cli.config.as_deref());
    }

    let config = load_config(&cli)?;
    let service = AssetStoreService::open(&config).context("Failed to open asset store")?;
    log_cli_debug!("Store ready", command = command_name(&cli.command));

    match cli.command {
        Commands::Count => admin::count(&service),
        Commands::Show { id } => admin::show(&service, &id),
        Commands::Delete { id } => admin::delete(&service, &id),
        Commands::Import(args) => import::run(&service, args),
        Commands::Put(args) => admin::put(&service, args),
        Commands::Get { id, output } => admin::get(&service, &id, output.as_deref()),
        Commands::Compact => admin::compact(&service),
        Commands::Stats { json } => admin::stats(&service, json),
        Commands::Serve => {
            let rt = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            rt.block_on(serve::run(service, config))
        }
        Commands::Config { .. } => Ok(()),
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::load().context("Failed to load config")?,
    };
    if let Some(base_dir) = &cli.base_dir {
        config.storage.base_dir = base_dir.clone();
    }
    Ok(config)
}

fn command_name(command: &Commands) -> &'static str {
    match command {
        Commands::Count => "count",
        Commands::Show { .. } => "show",
        Commands::Delete { .. } => "delete",
        Commands::Import(_) => "import",
        Commands::Put(_) => "put",
        Commands::Get { .. } => "get",
        Commands::Compact => "compact",
        Commands::Stats { .. } => "stats",
        Commands::Serve => "serve",
        Commands::Config { .. } => "config",
    }
}
