//! Cosine annealing learning rate scheduler

use super::{LRScheduler, SchedulerState};
use crate::Result;
use std::f32::consts::PI;

const NAME: &str = "cosine_annealing";

/// Cosine Annealing Learning Rate Scheduler
///
/// Decreases the learning rate following a cosine curve from lr_max to lr_min.
///
/// Formula: lr_t = lr_min + 0.5 * (lr_max - lr_min) * (1 + cos(pi * t / T))
///
/// Where:
/// - t is the current step
/// - T is the total number of steps
#[derive(Debug, Clone)]
pub struct CosineAnnealingLR {
    lr_max: f32,
    lr_min: f32,
    t_max: usize,
    current_step: usize,
}

impl CosineAnnealingLR {
    /// Create a new cosine annealing scheduler
    ///
    /// # Arguments
    /// * `lr_max` - Initial (maximum) learning rate
    /// * `t_max` - Total number of steps for the schedule
    /// * `lr_min` - Minimum learning rate
    pub fn new(lr_max: f32, t_max: usize, lr_min: f32) -> Self {
        Self { lr_max, lr_min, t_max, current_step: 0 }
    }
}

impl LRScheduler for CosineAnnealingLR {
    fn get_lr(&self) -> f32 {
        if self.current_step >= self.t_max {
            return self.lr_min;
        }

        let progress = self.current_step as f32 / self.t_max as f32;
        let cosine_decay = 0.5 * (1.0 + (PI * progress).cos());
        self.lr_min + (self.lr_max - self.lr_min) * cosine_decay
    }

    fn step(&mut self) {
        self.current_step += 1;
    }

    fn state(&self) -> SchedulerState {
        SchedulerState {
            name: NAME.to_string(),
            last_epoch: self.current_step,
            params: [
                ("lr_max".to_string(), self.lr_max),
                ("lr_min".to_string(), self.lr_min),
                ("t_max".to_string(), self.t_max as f32),
            ]
            .into_iter()
            .collect(),
        }
    }

    fn load_state(&mut self, state: &SchedulerState) -> Result<()> {
        state.expect_name(NAME)?;
        self.lr_max = state.param("lr_max")?;
        self.lr_min = state.param("lr_min")?;
        self.t_max = state.param("t_max")? as usize;
        self.current_step = state.last_epoch;
        Ok(())
    }
}
