//! CLI argument parsing

use crate::backends;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Generate dynamic help text for the backend argument
fn backend_help() -> String {
    format!(
        "Backend to use [available: {}]",
        backends::backend_names_short()
    )
}

#[derive(Parser)]
#[command(name = "spibridge")]
#[command(author, version, about = "Three-channel SPI bridge", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run operations given on the command line
    Run {
        /// Backend to use
        #[arg(short, long, help = backend_help())]
        backend: String,

        /// Operations, one per argument (e.g. "setup 0 mode=0,sck=5,mosi=6,cs=7")
        #[arg(required = true)]
        ops: Vec<String>,
    },

    /// Run operations from a script file
    Script {
        /// Backend to use
        #[arg(short, long, help = backend_help())]
        backend: String,

        /// Script path ("-" reads standard input)
        file: PathBuf,
    },

    /// List available backends
    ListBackends,
}
