use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use hardpy::config::HardpyConfig;

mod cmd;

#[derive(Parser)]
#[command(name = "hardpy")]
#[command(version, about = "Hardware test-run orchestrator")]
pub struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a default hardpy.toml and create the storage directory
    Init {
        /// Overwrite an existing hardpy.toml
        #[arg(long)]
        force: bool,
    },
    /// Show the live status of the current run
    Status {
        /// Print the raw state document as JSON
        #[arg(long)]
        json: bool,
    },
    /// Send an answer to the dialog or message waiting for the operator
    Reply {
        answer: String,

        /// Rendezvous address; defaults to the configured host and port
        #[arg(long)]
        addr: Option<String>,
    },
    /// Delete the stored run documents
    Clear,
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    let config = HardpyConfig::load_or_default(&project_dir);
    let mut logging = config
        .as_ref()
        .map(|c| c.logging.clone())
        .unwrap_or_default();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    let _log_guard = hardpy::logging::init_logging(&logging)?;

    match cli.command {
        Commands::Init { force } => cmd::cmd_init(&project_dir, force)?,
        Commands::Status { json } => cmd::cmd_status(&project_dir, &config?, json)?,
        Commands::Reply { answer, addr } => {
            let addr = match addr {
                Some(addr) => addr,
                None => config?.rendezvous.addr(),
            };
            cmd::cmd_reply(&addr, &answer).await?;
        }
        Commands::Clear => cmd::cmd_clear(&project_dir, &config?)?,
        Commands::Config { command } => cmd::cmd_config(&project_dir, &config?, command)?,
    }

    Ok(())
}
