//! Learning rate schedulers
//!
//! Provides epoch-level learning rate scheduling:
//! - `CosineAnnealingLR` - Smooth cosine decay
//! - `StepDecayLR` - Step decay by factor every N epochs

mod cosine_annealing;
mod step_decay;


pub use cosine_annealing::CosineAnnealingLR;
pub use step_decay::StepDecayLR;

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Serializable scheduler state, stored in every checkpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerState {
    pub name: String,
    /// Number of `step` calls so far
    pub last_epoch: usize,
    #[serde(default)]
    pub params: BTreeMap<String, f32>,
}

impl SchedulerState {
    fn expect_name(&self, name: &str) -> Result<()> {
        if self.name == name {
            Ok(())
        } else {
            Err(Error::Checkpoint(format!(
                "scheduler state belongs to '{}', expected '{name}'",
                self.name
            )))
        }
    }

    fn param(&self, key: &str) -> Result<f32> {
        self.params.get(key).copied().ok_or_else(|| {
            Error::Checkpoint(format!("scheduler state '{}' lacks '{key}'", self.name))
        })
    }
}

/// Learning rate scheduler trait
pub trait LRScheduler {
    /// Get the current learning rate
    fn get_lr(&self) -> f32;

    /// Step the scheduler, called once after each epoch
    fn step(&mut self);

    fn state(&self) -> SchedulerState;

    fn load_state(&mut self, state: &SchedulerState) -> Result<()>;
}
