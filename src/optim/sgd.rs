//! Stochastic Gradient Descent optimizer

use super::{Optimizer, OptimizerState};
use crate::model::Parameter;
use crate::{Error, Result};
use ndarray::ArrayD;

const VELOCITY: &str = "velocity";

/// SGD optimizer with optional momentum and L2 weight decay
///
/// Velocities are keyed by parameter position, so the same parameter slice
/// order must be passed on every step.
#[derive(Debug, Clone)]
pub struct SGD {
    lr: f32,
    momentum: f32,
    weight_decay: f32,
    velocities: Vec<Option<ArrayD<f32>>>,
}

impl SGD {
    /// Create a new SGD optimizer
    pub fn new(lr: f32, momentum: f32) -> Self {
        Self {
            lr,
            momentum,
            weight_decay: 0.0,
            velocities: Vec::new(),
        }
    }

    pub fn with_weight_decay(mut self, weight_decay: f32) -> Self {
        self.weight_decay = weight_decay;
        self
    }

    pub fn momentum(&self) -> f32 {
        self.momentum
    }

    /// Initialize velocities if needed
    fn ensure_velocities(&mut self, params: &[Parameter]) {
        if self.velocities.len() < params.len() {
            self.velocities.resize(params.len(), None);
        }
    }
}

impl Optimizer for SGD {
    fn step(&mut self, params: &mut [Parameter]) {
        self.ensure_velocities(params);

        for (param, velocity) in params.iter_mut().zip(self.velocities.iter_mut()) {
            if !param.requires_grad() {
                continue;
            }
            let Some(grad) = param.grad() else {
                continue;
            };
            let mut grad = grad.clone();
            if self.weight_decay > 0.0 {
                grad.scaled_add(self.weight_decay, param.data());
            }

            if self.momentum > 0.0 {
                // v = momentum * v - lr * grad; p += v
                let v = velocity.get_or_insert_with(|| ArrayD::zeros(grad.raw_dim()));
                v.mapv_inplace(|x| x * self.momentum);
                v.scaled_add(-self.lr, &grad);
                *param.data_mut() += &*v;
            } else {
                param.data_mut().scaled_add(-self.lr, &grad);
            }
        }
    }

    fn lr(&self) -> f32 {
        self.lr
    }

    fn set_lr(&mut self, lr: f32) {
        self.lr = lr;
    }

    fn state(&self) -> OptimizerState {
        let mut state = OptimizerState::new("sgd", self.lr);
        state.hyperparams.insert("momentum".to_string(), self.momentum);
        state
            .hyperparams
            .insert("weight_decay".to_string(), self.weight_decay);
        for (i, velocity) in self.velocities.iter().enumerate() {
            if let Some(v) = velocity {
                state.buffers.insert(format!("{VELOCITY}.{i}"), v.clone());
            }
        }
        state
    }

    fn load_state(&mut self, state: &OptimizerState) -> Result<()> {
        state.expect_name("sgd")?;
        let mut velocities = Vec::new();
        for (key, tensor) in &state.buffers {
            let index = key
                .strip_prefix(VELOCITY)
                .and_then(|rest| rest.strip_prefix('.'))
                .and_then(|idx| idx.parse::<usize>().ok())
                .ok_or_else(|| Error::Checkpoint(format!("unexpected SGD buffer '{key}'")))?;
            if velocities.len() <= index {
                velocities.resize(index + 1, None);
            }
            velocities[index] = Some(tensor.clone());
        }

        self.lr = state.lr;
        self.momentum = state.hyperparam("momentum").unwrap_or(self.momentum);
        self.weight_decay = state.hyperparam("weight_decay").unwrap_or(self.weight_decay);
        self.velocities = velocities;
        Ok(())
    }
}
