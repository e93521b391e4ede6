//! ecu-logger - live logging and firmware transfer for Saab Trionic ECUs
//!
//! Usage:
//!   ecu-logger [--config logger.toml] log --variables t8.yaml
//!   ecu-logger dump t8-backup.bin
//!   ecu-logger flash tuned.bin
//!   ecu-logger replay logs/trionic8-2024-03-09_14-05-07.t8l

mod commands;
mod config;
mod progress;

use anyhow::Result;
use clap::{Parser, Subcommand};
use ecu_diag::EcuKind;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::Overrides;

#[derive(Parser)]
#[command(name = "ecu-logger")]
#[command(author, version, about = "Trionic ECU live logger and flasher")]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path (TOML)
    #[arg(short, long, env = "ECU_LOGGER_CONFIG")]
    config: Option<PathBuf>,

    /// ECU type: t7, t8, z22se, mcp
    #[arg(short, long, env = "ECU_LOGGER_ECU", value_parser = parse_kind)]
    ecu: Option<EcuKind>,

    /// SocketCAN interface, overrides the configured transport
    #[arg(short, long, env = "ECU_LOGGER_INTERFACE")]
    interface: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log live data until Ctrl+C
    Log {
        /// Polling frequency in Hz
        #[arg(long = "freq")]
        frequency: Option<u32>,

        /// Variable definition file (YAML or JSON)
        #[arg(long)]
        variables: Option<PathBuf>,

        /// Directory for log files
        #[arg(long)]
        log_dir: Option<PathBuf>,

        /// Print these signals as they change
        #[arg(long, value_delimiter = ',')]
        watch: Vec<String>,
    },

    /// Read the complete firmware into a file
    Dump {
        /// Output file
        output: PathBuf,
    },

    /// Write a firmware image
    Flash {
        /// Firmware image
        file: PathBuf,
    },

    /// Leave the loader and restart the ECU
    Reset,

    /// Summarise a recorded log file
    Replay {
        /// Log file (.t7l or .t8l)
        file: PathBuf,
    },
}

fn parse_kind(s: &str) -> Result<EcuKind, String> {
    s.parse::<EcuKind>().map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("ecu_logger=debug,ecu_diag=debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("ecu_logger=info,ecu_diag=info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    let mut overrides = Overrides {
        ecu: cli.ecu,
        interface: cli.interface.clone(),
        ..Overrides::default()
    };

    match cli.command {
        Commands::Log {
            frequency,
            variables,
            log_dir,
            watch,
        } => {
            overrides.frequency_hz = frequency;
            overrides.variables = variables;
            overrides.log_dir = log_dir;
            let config = config::load(cli.config.as_deref(), &overrides)?;
            commands::log(&config, &watch).await?;
        }

        Commands::Dump { output } => {
            let config = config::load(cli.config.as_deref(), &overrides)?;
            commands::dump(&config, &output).await?;
        }

        Commands::Flash { file } => {
            let config = config::load(cli.config.as_deref(), &overrides)?;
            commands::flash(&config, &file).await?;
        }

        Commands::Reset => {
            let config = config::load(cli.config.as_deref(), &overrides)?;
            commands::reset(&config).await?;
        }

        Commands::Replay { file } => {
            commands::replay(&file)?;
        }
    }

    Ok(())
}
