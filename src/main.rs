//! Afinar CLI
//!
//! # Usage
//!
//! ```bash
//! # Train on synthetic data from a config
//! afinar train config.yaml
//!
//! # Train with overrides, resuming after epoch 3
//! afinar train config.yaml --epochs 10 --resume ./checkpoints/model_epoch-3.pt
//!
//! # Validate config
//! afinar validate config.yaml --detailed
//!
//! # Summarize a checkpoint
//! afinar inspect ./checkpoints/model_epoch-3.pt --format json
//! ```

use afinar::cli::{run_command, Cli};
use clap::Parser;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run_command(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
