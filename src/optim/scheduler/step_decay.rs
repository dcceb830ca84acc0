//! Step decay learning rate scheduler

use super::{LRScheduler, SchedulerState};
use crate::Result;

const NAME: &str = "step_decay";

/// Step Decay Learning Rate Scheduler
///
/// Multiplies learning rate by gamma every step_size epochs.
///
/// Formula: lr_t = lr_initial * gamma^(floor(epoch / step_size))
#[derive(Debug, Clone)]
pub struct StepDecayLR {
    lr_initial: f32,
    gamma: f32,
    step_size: usize,
    current_epoch: usize,
}

impl StepDecayLR {
    /// Create a new step decay scheduler
    ///
    /// # Arguments
    /// * `lr_initial` - Initial learning rate
    /// * `step_size` - Decay LR every step_size epochs
    /// * `gamma` - Multiplicative factor (e.g., 0.1 for 10x reduction)
    pub fn new(lr_initial: f32, step_size: usize, gamma: f32) -> Self {
        Self { lr_initial, gamma, step_size, current_epoch: 0 }
    }
}

impl LRScheduler for StepDecayLR {
    fn get_lr(&self) -> f32 {
        if self.step_size == 0 {
            return self.lr_initial;
        }
        let num_decays = self.current_epoch / self.step_size;
        self.lr_initial * self.gamma.powi(num_decays as i32)
    }

    fn step(&mut self) {
        self.current_epoch += 1;
    }

    fn state(&self) -> SchedulerState {
        SchedulerState {
            name: NAME.to_string(),
            last_epoch: self.current_epoch,
            params: [
                ("lr_initial".to_string(), self.lr_initial),
                ("gamma".to_string(), self.gamma),
                ("step_size".to_string(), self.step_size as f32),
            ]
            .into_iter()
            .collect(),
        }
    }

    fn load_state(&mut self, state: &SchedulerState) -> Result<()> {
        state.expect_name(NAME)?;
        self.lr_initial = state.param("lr_initial")?;
        self.gamma = state.param("gamma")?;
        self.step_size = state.param("step_size")? as usize;
        self.current_epoch = state.last_epoch;
        Ok(())
    }
}
