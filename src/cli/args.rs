//! CLI argument definitions using clap
//!
//! Commands:
//! - aeroplane init --config <path>
//! - aeroplane start --config <path> [--mode <mode>]
//! - aeroplane status --config <path>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// aeroplane - high-availability coordinator for a management plane
#[derive(Parser, Debug)]
#[command(name = "aeroplane")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Assign a node id and prepare the shared store
    Init {
        /// Path to configuration file
        #[arg(long, default_value = "./aeroplane.json")]
        config: PathBuf,
    },

    /// Run the coordinator until interrupted
    Start {
        /// Path to configuration file
        #[arg(long, default_value = "./aeroplane.json")]
        config: PathBuf,

        /// Override the configured start mode (auto, master, standby, warm_standby, disabled)
        #[arg(long)]
        mode: Option<String>,
    },

    /// Print the plane as seen from the shared store
    Status {
        /// Path to configuration file
        #[arg(long, default_value = "./aeroplane.json")]
        config: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
