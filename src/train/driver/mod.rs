//! Epoch training driver
//!
//! [`EpochDriver`] owns the model, its EMA shadow, the sharpness-aware
//! optimizer and the LR schedule, and runs the epoch state machine:
//!
//! - warm-up freeze/unfreeze at the start of each epoch
//! - per batch: augmentation choice, two forward/backward passes, two
//!   optimizer steps, EMA update
//! - TTA evaluation on the EMA shadow (or the live model)
//! - history, LR schedule, best-epoch tracking, one checkpoint per epoch
//!
//! # Example
//!
//! ```no_run
//! use afinar::augment::PassThroughMix;
//! use afinar::config::RunSpec;
//! use afinar::model::NormLinearClassifier;
//! use afinar::train::{EpochDriver, ProgressCallback, VecLoaders};
//!
//! # fn main() -> afinar::Result<()> {
//! let spec: RunSpec = serde_yaml::from_str("training:\n  num_epoch: 3\n")
//!     .map_err(|e| afinar::Error::ConfigError(e.to_string()))?;
//! let model = NormLinearClassifier::new(12, 5, 0)?;
//! let mut driver = EpochDriver::from_spec(&spec, model, Box::new(PassThroughMix))?;
//! driver.add_callback(ProgressCallback::new());
//!
//! let mut loaders = VecLoaders::default();
//! let report = driver.run(&mut loaders, &spec.save_path)?;
//! println!("best epoch {}", report.best.epoch);
//! # Ok(())
//! # }
//! ```

mod core;
mod epoch;
mod result;
mod step;
mod train_loop;

pub use self::core::EpochDriver;
pub use result::{EpochSummary, StepOutcome, TrainReport};
pub use step::select_path;
