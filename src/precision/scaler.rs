//! Gradient scaler for mixed-precision training.

use super::MixedPrecisionConfig;
use crate::model::Parameter;
use ndarray::Array2;

/// Gradient scaler for mixed-precision training
///
/// Handles loss scaling to prevent gradient underflow in fp16 training.
#[derive(Debug, Clone)]
pub struct GradScaler {
    /// Current loss scale
    scale: f32,
    /// Growth factor
    growth_factor: f32,
    /// Backoff factor
    backoff_factor: f32,
    /// Growth interval
    pub(crate) growth_interval: usize,
    /// Steps since last growth
    steps_since_growth: usize,
    /// Whether dynamic scaling is enabled
    dynamic: bool,
    /// Number of overflows encountered
    overflow_count: usize,
}

impl GradScaler {
    /// Create from config
    pub fn from_config(config: &MixedPrecisionConfig) -> Self {
        Self {
            scale: config.initial_scale,
            growth_factor: config.scale_growth_factor,
            backoff_factor: config.scale_backoff_factor,
            growth_interval: config.scale_growth_interval,
            steps_since_growth: 0,
            dynamic: config.dynamic_scaling,
            overflow_count: 0,
        }
    }

    /// Get current scale
    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Scale the upstream gradient of the loss w.r.t. the logits
    ///
    /// Equivalent to calling backward on `loss * scale`.
    pub fn scale_grad(&self, grad: &Array2<f32>) -> Array2<f32> {
        grad * self.scale
    }

    /// Unscale gradients in place; false if any is inf/NaN
    fn unscale_and_check(&self, grads: &mut [f32]) -> bool {
        let inv_scale = 1.0 / self.scale;
        let mut has_overflow = false;

        for grad in grads.iter_mut() {
            *grad *= inv_scale;
            if !grad.is_finite() {
                has_overflow = true;
            }
        }

        !has_overflow
    }

    /// Unscale every accumulated parameter gradient in place
    ///
    /// Returns true if all gradients are finite.
    pub fn unscale_params(&self, params: &mut [Parameter]) -> bool {
        let inv_scale = 1.0 / self.scale;
        let mut valid = true;
        for grad in params.iter_mut().filter_map(Parameter::grad_mut) {
            valid &= match grad.as_slice_mut() {
                Some(slice) => self.unscale_and_check(slice),
                None => {
                    grad.mapv_inplace(|g| g * inv_scale);
                    grad.iter().all(|g| g.is_finite())
                }
            };
        }
        valid
    }

    /// Update the scale after a step
    ///
    /// Call this after each optimizer step. Pass `true` if gradients were valid.
    /// Overflows are counted even when the scale is fixed.
    pub fn update(&mut self, grads_valid: bool) {
        if !grads_valid {
            self.overflow_count += 1;
        }
        if !self.dynamic {
            return;
        }

        if grads_valid {
            self.steps_since_growth += 1;

            if self.steps_since_growth >= self.growth_interval {
                self.scale *= self.growth_factor;
                self.steps_since_growth = 0;
            }
        } else {
            self.scale *= self.backoff_factor;
            self.steps_since_growth = 0;
            self.scale = self.scale.max(1.0);
        }
    }

    /// Overflows seen so far
    pub fn overflow_count(&self) -> usize {
        self.overflow_count
    }
}
