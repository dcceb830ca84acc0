//! Sharpness-aware minimization
//!
//! SAM updates in two passes per batch. The first step climbs to the worst-case
//! point inside a `rho` ball around the current weights; the second step
//! returns to the original weights and applies the base optimizer using the
//! gradient measured at the perturbed point.

use super::{Optimizer, OptimizerState};
use crate::model::Parameter;
use crate::Result;
use ndarray::ArrayD;

const NORM_EPS: f32 = 1e-12;

/// Two-step optimizer interface driven once per batch
pub trait SharpnessAware {
    /// Perturb the weights along the current gradient
    fn first_step(&mut self, params: &mut [Parameter], zero_grad: bool);

    /// Undo the perturbation and apply the base update
    fn second_step(&mut self, params: &mut [Parameter], zero_grad: bool);

    /// Undo the perturbation without updating, for a skipped second step
    fn restore(&mut self, params: &mut [Parameter]);

    fn zero_grad(&mut self, params: &mut [Parameter]) {
        for param in params {
            param.zero_grad();
        }
    }

    fn lr(&self) -> f32;

    fn set_lr(&mut self, lr: f32);

    fn state(&self) -> OptimizerState;

    fn load_state(&mut self, state: &OptimizerState) -> Result<()>;
}

/// Global gradient norm, each gradient optionally weighted by `|p|`
///
/// Frozen parameters and parameters without a gradient do not contribute.
pub fn grad_norm(params: &[Parameter], adaptive: bool) -> f32 {
    let mut total_norm_sq = 0.0;
    for param in params.iter().filter(|p| p.requires_grad()) {
        if let Some(grad) = param.grad() {
            total_norm_sq += if adaptive {
                grad.iter()
                    .zip(param.data().iter())
                    .map(|(&g, &p)| (p.abs() * g).powi(2))
                    .sum::<f32>()
            } else {
                grad.iter().map(|&g| g * g).sum::<f32>()
            };
        }
    }
    total_norm_sq.sqrt()
}

/// SAM wrapper over any base optimizer
#[derive(Debug, Clone)]
pub struct Sam<O: Optimizer> {
    base: O,
    rho: f32,
    adaptive: bool,
    /// Weights before the perturbation, per parameter that was moved
    saved: Vec<Option<ArrayD<f32>>>,
}

impl<O: Optimizer> Sam<O> {
    /// Wrap `base` with neighborhood size `rho`
    pub fn new(base: O, rho: f32) -> Self {
        Self {
            base,
            rho,
            adaptive: false,
            saved: Vec::new(),
        }
    }

    /// Scale the perturbation per weight by `p^2` (ASAM)
    pub fn adaptive(mut self, adaptive: bool) -> Self {
        self.adaptive = adaptive;
        self
    }

    pub fn rho(&self) -> f32 {
        self.rho
    }

    pub fn base(&self) -> &O {
        &self.base
    }

    /// Whether weights currently sit at a perturbed point
    pub fn is_perturbed(&self) -> bool {
        self.saved.iter().any(Option::is_some)
    }
}

impl<O: Optimizer> SharpnessAware for Sam<O> {
    fn first_step(&mut self, params: &mut [Parameter], zero_grad: bool) {
        let scale = self.rho / (grad_norm(params, self.adaptive) + NORM_EPS);
        self.saved = vec![None; params.len()];

        for (param, slot) in params.iter_mut().zip(self.saved.iter_mut()) {
            if !param.requires_grad() {
                continue;
            }
            let Some(grad) = param.grad() else {
                continue;
            };
            let e_w = if self.adaptive {
                ndarray::Zip::from(grad)
                    .and(param.data())
                    .map_collect(|&g, &p| p * p * g * scale)
            } else {
                grad * scale
            };
            *slot = Some(param.data().clone());
            *param.data_mut() += &e_w;
        }

        if zero_grad {
            SharpnessAware::zero_grad(self, params);
        }
    }

    fn second_step(&mut self, params: &mut [Parameter], zero_grad: bool) {
        self.restore(params);
        self.base.step(params);
        if zero_grad {
            SharpnessAware::zero_grad(self, params);
        }
    }

    /// Put back the exact pre-perturbation weights
    fn restore(&mut self, params: &mut [Parameter]) {
        for (param, slot) in params.iter_mut().zip(self.saved.iter_mut()) {
            if let Some(original) = slot.take() {
                *param.data_mut() = original;
            }
        }
    }

    fn lr(&self) -> f32 {
        self.base.lr()
    }

    fn set_lr(&mut self, lr: f32) {
        self.base.set_lr(lr);
    }

    fn state(&self) -> OptimizerState {
        let mut state = OptimizerState::new("sam", self.base.lr());
        state.hyperparams.insert("rho".to_string(), self.rho);
        state
            .hyperparams
            .insert("adaptive".to_string(), if self.adaptive { 1.0 } else { 0.0 });
        state.inner = Some(Box::new(self.base.state()));
        state
    }

    fn load_state(&mut self, state: &OptimizerState) -> Result<()> {
        state.expect_name("sam")?;
        if let Some(inner) = &state.inner {
            self.base.load_state(inner)?;
        }
        self.base.set_lr(state.lr);
        self.rho = state.hyperparam("rho").unwrap_or(self.rho);
        if let Some(flag) = state.hyperparam("adaptive") {
            self.adaptive = flag != 0.0;
        }
        self.saved.clear();
        Ok(())
    }
}
