//! splmeter CLI - streaming sound level meter
//!
//! Command-line front end for the splmeter engine.

use anyhow::Result;
use clap::Parser;
use env_logger::Env;
use log::info;

use splmeter::cli::{commands, Cli, Commands};

fn main() -> Result<()> {
    // Initialize logger
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    info!("splmeter v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Some(Commands::Measure {
            file,
            blocksize,
            chains,
            sensitivity,
            leq,
            json,
        }) => {
            commands::measure(&file, blocksize, &chains, sensitivity, leq, json)?;
            Ok(())
        }
        None => {
            println!("splmeter v{}", env!("CARGO_PKG_VERSION"));
            println!("Use --help for available commands");
            Ok(())
        }
    }
}
