//! Loss-scaling configuration per compute precision.

use super::Precision;

/// Clean steps between scale increases
const SCALE_GROWTH_INTERVAL: usize = 2000;

/// Configuration for mixed-precision training
#[derive(Debug, Clone, PartialEq)]
pub struct MixedPrecisionConfig {
    /// Initial loss scale factor
    pub initial_scale: f32,
    /// Factor to increase scale by after `scale_growth_interval` clean steps
    pub scale_growth_factor: f32,
    /// Factor to decrease scale by on overflow
    pub scale_backoff_factor: f32,
    /// Number of successful steps before increasing scale
    pub scale_growth_interval: usize,
    /// Whether to use dynamic loss scaling
    pub dynamic_scaling: bool,
}

impl MixedPrecisionConfig {
    /// Plain fp32 training, loss scale fixed at 1
    pub fn fp32() -> Self {
        Self {
            initial_scale: 1.0,
            scale_growth_factor: 2.0,
            scale_backoff_factor: 0.5,
            scale_growth_interval: SCALE_GROWTH_INTERVAL,
            dynamic_scaling: false,
        }
    }

    /// fp16 activations with dynamic loss scaling starting at 2^16
    pub fn fp16() -> Self {
        Self {
            initial_scale: 65536.0,
            scale_growth_factor: 2.0,
            scale_backoff_factor: 0.5,
            scale_growth_interval: SCALE_GROWTH_INTERVAL,
            dynamic_scaling: true,
        }
    }

    /// bf16 activations; the wide exponent makes scaling unnecessary
    pub fn bf16() -> Self {
        Self {
            initial_scale: 1.0,
            scale_growth_factor: 2.0,
            scale_backoff_factor: 0.5,
            scale_growth_interval: SCALE_GROWTH_INTERVAL,
            dynamic_scaling: false,
        }
    }

    /// Preset for a compute precision
    pub fn for_precision(precision: Precision) -> Self {
        match precision {
            Precision::Fp32 => Self::fp32(),
            Precision::Fp16 => Self::fp16(),
            Precision::Bf16 => Self::bf16(),
        }
    }
}
