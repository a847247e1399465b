//! CLI module for aeroplane
//!
//! Provides command-line interface for:
//! - init: Assign a node id and prepare the shared store
//! - start: Run the coordinator until interrupted
//! - status: Print the plane as recorded in the store

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{init, run, run_command, start, status, NodeConfig};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{write_error, write_response};
