//! spibridge - Three-channel SPI bridge
//!
//! Runs spibridge operations against a backend: channel 0 bit-banged on
//! GPIO lines, channels 1 and 2 on hardware SPI ports. Operations come from
//! the command line or from a script, see [`script`] for the grammar.

mod backends;
mod cli;
mod script;

use clap::Parser;
use cli::{Cli, Commands};
use std::io::Read;
use std::path::Path;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    let (backend, ops) = match &cli.command {
        Commands::Run { backend, ops } => (backend, parse_args(ops)?),
        Commands::Script { backend, file } => {
            (backend, script::parse_script(&load_script(file)?)?)
        }
        Commands::ListBackends => {
            print!("{}", backends::backend_help());
            return Ok(());
        }
    };

    backends::with_backend(backend, |bridge| {
        let failures = script::run(bridge, &ops);
        if failures > 0 {
            return Err(format!("{} of {} operations failed", failures, ops.len()).into());
        }
        Ok(())
    })
}

fn parse_args(args: &[String]) -> Result<Vec<script::Op>, String> {
    let mut ops = Vec::new();
    for (n, arg) in args.iter().enumerate() {
        if let Some(op) =
            script::parse_line(arg).map_err(|e| format!("operation {}: {}", n + 1, e))?
        {
            ops.push(op);
        }
    }
    Ok(ops)
}

fn load_script(path: &Path) -> Result<String, Box<dyn std::error::Error>> {
    if path == Path::new("-") {
        let mut source = String::new();
        std::io::stdin().read_to_string(&mut source)?;
        return Ok(source);
    }
    std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e).into())
}
