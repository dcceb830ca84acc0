//! Run configuration
//!
//! YAML schema, validation, CLI argument parsing and the single-command
//! training entry points.

pub mod cli;
mod schema;
mod train;
pub mod validate;

pub use cli::{apply_overrides, parse_args, Cli, Command, InspectArgs, OutputFormat, TrainArgs, ValidateArgs};
pub use schema::{
    AugmentSelection, LossSpec, ModelParams, OptimSpec, RunSpec, SchedulerSpec, TrainingParams,
    DEFAULT_NUM_LAYER,
};
pub use train::{
    create_demo_batches, create_demo_loaders, load_spec, parse_spec, train_from_spec, train_from_yaml,
    DEMO_FEATURES, DEMO_IMAGE_SHAPE,
};
pub use validate::{validate_config, ValidationError};
