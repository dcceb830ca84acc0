//! Main entry points for YAML-based training

use super::demo::{create_demo_loaders, DEMO_FEATURES};
use crate::augment::PassThroughMix;
use crate::config::schema::RunSpec;
use crate::config::validate::validate_config;
use crate::error::{Error, Result};
use crate::io::Checkpoint;
use crate::model::{ImageClassifier, NormLinearClassifier};
use crate::train::{EpochDriver, ProgressCallback, TrainReport};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Read, parse and validate a run configuration
pub fn load_spec<P: AsRef<Path>>(config_path: P) -> Result<RunSpec> {
    let path = config_path.as_ref();
    let yaml = fs::read_to_string(path).map_err(|e| {
        Error::ConfigError(format!("Failed to read config file {}: {e}", path.display()))
    })?;
    let spec = parse_spec(&yaml)?;
    validate_config(&spec)?;
    Ok(spec)
}

/// Parse a run configuration without validating it
pub fn parse_spec(yaml: &str) -> Result<RunSpec> {
    serde_yaml::from_str(yaml)
        .map_err(|e| Error::ConfigError(format!("Failed to parse YAML config: {e}")))
}

/// Train the reference classifier on synthetic data from a YAML file
///
/// # Example
///
/// ```no_run
/// use afinar::config::train_from_yaml;
///
/// let report = train_from_yaml("config.yaml", None)?;
/// println!("best epoch {}", report.best.epoch);
/// # Ok::<(), afinar::Error>(())
/// ```
pub fn train_from_yaml<P: AsRef<Path>>(config_path: P, resume: Option<&Path>) -> Result<TrainReport> {
    let spec = load_spec(config_path)?;
    train_from_spec(&spec, resume, true)
}

/// Train the reference classifier on synthetic data
///
/// The checkpoint in `resume`, if any, is restored before the run starts.
pub fn train_from_spec(spec: &RunSpec, resume: Option<&Path>, progress: bool) -> Result<TrainReport> {
    let seed = spec.training.seed;
    let model = NormLinearClassifier::new(DEMO_FEATURES, spec.model.num_classes, seed)?;
    if spec.training.num_layer > model.inventory().len() {
        warn!(
            num_layer = spec.training.num_layer,
            params = model.inventory().len(),
            "num_layer exceeds the parameter count; warm-up freezes every parameter"
        );
    }

    let mut driver = EpochDriver::from_spec(spec, model, Box::new(PassThroughMix))?;
    if progress {
        driver.add_callback(ProgressCallback::new());
    }
    if let Some(path) = resume {
        let checkpoint = Checkpoint::load(path)?;
        driver.resume_from(&checkpoint)?;
        info!(path = %path.display(), "resuming");
    }

    let mut loaders = create_demo_loaders(spec.model.num_classes, seed)?;
    driver.run(&mut loaders, &spec.save_path)
}
