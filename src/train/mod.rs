//! Epoch-based classifier training
//!
//! This module provides the training state machine and its parts:
//! - Classification losses (cross-entropy, bi-tempered logistic)
//! - Top-1 accuracy over averaged predictions
//! - Freeze/unfreeze warm-up schedule
//! - TTA evaluation
//! - History and best-epoch tracking
//! - Callbacks for progress output
//! - [`EpochDriver`], which ties them together
//!
//! # Example
//!
//! ```no_run
//! use afinar::augment::PassThroughMix;
//! use afinar::config::TrainingParams;
//! use afinar::model::NormLinearClassifier;
//! use afinar::optim::{CosineAnnealingLR, Sam, SGD};
//! use afinar::train::{EpochDriver, VecLoaders};
//! use std::path::Path;
//!
//! # fn main() -> afinar::Result<()> {
//! let model = NormLinearClassifier::new(12, 5, 0)?;
//! let optimizer = Sam::new(SGD::new(0.01, 0.9), 0.05);
//! let scheduler = CosineAnnealingLR::new(0.01, 10, 1e-6);
//! let mut driver = EpochDriver::new(
//!     model,
//!     Box::new(optimizer),
//!     Box::new(scheduler),
//!     Box::new(PassThroughMix),
//!     TrainingParams::new(10),
//! )
//! .with_ema(0.9999);
//!
//! let report = driver.run(&mut VecLoaders::default(), Path::new("checkpoints/model"))?;
//! println!("best accuracy {:.4}", report.best.accuracy);
//! # Ok(())
//! # }
//! ```

mod batch;
pub mod callback;
mod driver;
mod eval;
mod history;
mod loss;
mod metrics;
mod warmup;

pub use batch::{Batch, BatchIter, DataLoaders, VecLoaders};
pub use callback::{
    CallbackAction, CallbackContext, CallbackManager, ProgressCallback, TrainerCallback,
};
pub use driver::{select_path, EpochDriver, EpochSummary, StepOutcome, TrainReport};
pub use eval::{evaluate_tta, EvalReport, PassReport, TtaAccumulator};
pub use history::{BestEpoch, EpochRecord, History, RunningLoss};
pub use loss::{exp_t, log_softmax_rows, log_t, tempered_softmax, BiTemperedLoss, CrossEntropyLoss, LossFn};
pub use metrics::{accuracy, argmax_rows};
pub use warmup::{WarmupPhase, WarmupSchedule, WarmupTransition, STEADY_TTA_TIME, WARMUP_TTA_TIME};
