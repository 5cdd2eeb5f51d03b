//! issue-harvest: resumable extraction of issue-tracker records into training data

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use issue_harvest::config::{Config, LogFormat, LoggingConfig};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "issue-harvest")]
#[command(about = "Harvest issue-tracker collections into JSON-lines training data")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: PathBuf,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Harvest collections, resuming each from its checkpoint
    Run {
        /// Only harvest these collections (default: all configured)
        #[arg(long = "collection", value_name = "ID")]
        collections: Vec<String>,

        /// Disable the progress bar
        #[arg(short, long)]
        quiet: bool,
    },

    /// Show the checkpoint of every configured collection
    Status,

    /// Delete checkpoints so collections start over (output files are kept)
    Reset {
        /// Collections to reset
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        ids: Vec<String>,

        /// Reset every configured collection
        #[arg(long)]
        all: bool,
    },

    /// Write a default configuration file
    Init {
        /// Output path
        #[arg(default_value = "config.toml")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn init_logging(logging: &LoggingConfig, verbose: u8) -> Result<()> {
    let level = logging.level.more_verbose(verbose);
    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match logging.format {
        LogFormat::Text => tracing::subscriber::set_global_default(builder.finish())?,
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Init { path, force } = &cli.command {
        init_logging(&LoggingConfig::default(), cli.verbose)?;
        return commands::init::init_config(path, *force);
    }

    let config = Config::load(&cli.config)?;
    init_logging(&config.logging, cli.verbose)?;

    match cli.command {
        Commands::Run { collections, quiet } => {
            commands::run::run_harvest(config, collections, quiet).await
        }
        Commands::Status => commands::status::show_status(&config),
        Commands::Reset { ids, all } => commands::reset::reset_checkpoints(&config, ids, all),
        Commands::Init { .. } => Ok(()),
    }
}
