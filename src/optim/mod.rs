//! Optimizers for training neural networks

mod optimizer;
mod sam;
mod scheduler;
mod sgd;

pub use optimizer::{Optimizer, OptimizerState};
pub use sam::{grad_norm, Sam, SharpnessAware};
pub use scheduler::{CosineAnnealingLR, LRScheduler, SchedulerState, StepDecayLR};
pub use sgd::SGD;
