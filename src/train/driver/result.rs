//! Outcomes of a step, an epoch and a run

use crate::augment::AugmentPath;
use crate::train::eval::EvalReport;
use crate::train::history::{BestEpoch, History};
use crate::train::warmup::WarmupPhase;
use std::path::PathBuf;

/// Result of one training batch
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepOutcome {
    /// Loss of the second forward pass, the one the epoch loss accumulates
    pub loss: f32,
    /// Loss of the first forward pass
    pub first_loss: f32,
    pub path: AugmentPath,
    /// Labels counted toward the epoch loss denominator
    pub label_count: usize,
    /// At least one of the two optimizer steps was skipped on overflow
    pub skipped: bool,
}

/// Result of one epoch
#[derive(Debug, Clone, PartialEq)]
pub struct EpochSummary {
    pub epoch: usize,
    pub phase: WarmupPhase,
    pub train_loss: f64,
    pub eval: EvalReport,
    /// Learning rate the epoch trained with
    pub lr: f32,
    /// Learning rate after the scheduler step
    pub next_lr: f32,
    pub improved: bool,
    pub steps: usize,
}

/// Result of a training run
#[derive(Debug, Clone)]
pub struct TrainReport {
    pub best: BestEpoch,
    pub history: History,
    /// Checkpoint written by the last completed epoch
    pub last_checkpoint: Option<PathBuf>,
    /// A callback asked the run to stop before `num_epoch`
    pub stopped_early: bool,
    /// Passes whose gradients overflowed, across the whole run
    pub overflows: usize,
    pub elapsed_secs: f64,
}
