//! Optimizer trait

use crate::model::Parameter;
use crate::{Error, Result};
use ndarray::ArrayD;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Serializable optimizer state
///
/// `buffers` holds per-parameter tensors keyed by kind and parameter position,
/// e.g. `"velocity.3"` for the fourth parameter.
/// Wrapping optimizers keep the wrapped optimizer's state in `inner`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerState {
    pub name: String,
    pub lr: f32,
    #[serde(default)]
    pub hyperparams: BTreeMap<String, f32>,
    #[serde(default)]
    pub buffers: BTreeMap<String, ArrayD<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inner: Option<Box<OptimizerState>>,
}

impl OptimizerState {
    pub fn new(name: impl Into<String>, lr: f32) -> Self {
        Self {
            name: name.into(),
            lr,
            hyperparams: BTreeMap::new(),
            buffers: BTreeMap::new(),
            inner: None,
        }
    }

    /// Fail unless the state was produced by an optimizer called `name`
    pub fn expect_name(&self, name: &str) -> Result<()> {
        if self.name == name {
            Ok(())
        } else {
            Err(Error::Checkpoint(format!(
                "optimizer state belongs to '{}', expected '{name}'",
                self.name
            )))
        }
    }

    pub fn hyperparam(&self, key: &str) -> Option<f32> {
        self.hyperparams.get(key).copied()
    }
}

/// Trait for optimization algorithms over a parameter inventory
pub trait Optimizer {
    /// Perform a single optimization step
    ///
    /// Parameters without gradient tracking or without a gradient are left untouched.
    fn step(&mut self, params: &mut [Parameter]);

    /// Zero out all gradients
    fn zero_grad(&mut self, params: &mut [Parameter]) {
        for param in params {
            param.zero_grad();
        }
    }

    /// Get learning rate
    fn lr(&self) -> f32;

    /// Set learning rate
    fn set_lr(&mut self, lr: f32);

    /// Snapshot of the optimizer's internal state
    fn state(&self) -> OptimizerState;

    /// Restore internal state from a snapshot
    fn load_state(&mut self, state: &OptimizerState) -> Result<()>;
}
