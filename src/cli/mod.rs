//! CLI Module
//!
//! Command-line interface for the splmeter engine.

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// splmeter - streaming sound level meter
#[derive(Parser, Debug)]
#[command(name = "splmeter")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the meter over a WAV file and report per-block levels
    #[command(name = "measure")]
    Measure {
        /// Input WAV file
        file: PathBuf,

        /// Samples per processing block
        #[arg(long, default_value_t = 1024)]
        blocksize: usize,

        /// Processing chain as comma-separated tokens, e.g. "A,fast".
        /// May be given multiple times; defaults to "Z,fast".
        #[arg(long = "chain")]
        chains: Vec<String>,

        /// Calibration sensitivity scalar
        #[arg(long, default_value_t = 1.0)]
        sensitivity: f64,

        /// Leq averaging window in seconds; adds an "eq" stage to every
        /// chain's bus root
        #[arg(long)]
        leq: Option<f64>,

        /// Emit one JSON object per block instead of plain text
        #[arg(long)]
        json: bool,
    },
}
