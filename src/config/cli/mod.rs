//! CLI argument parsing
//!
//! # Usage
//!
//! ```bash
//! afinar train config.yaml
//! afinar train config.yaml --epochs 10 --save-path ./checkpoints/effnet
//! afinar train config.yaml --resume ./checkpoints/effnet_epoch-3.pt
//! afinar validate config.yaml --detailed
//! afinar inspect ./checkpoints/effnet_epoch-3.pt --format json
//! ```

mod core;
mod types;

pub use core::{apply_overrides, parse_args, Cli, Command, InspectArgs, TrainArgs, ValidateArgs};
pub use types::OutputFormat;
