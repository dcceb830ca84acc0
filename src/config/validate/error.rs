//! Validation error types
//!
//! Defines all validation error variants for run specifications.

/// Validation error type
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid epochs: {0} (must be > 0)")]
    InvalidEpochs(usize),

    #[error("Invalid start epoch: {start} (must be in 1..={max})")]
    InvalidStartEpoch { start: usize, max: usize },

    #[error("Invalid TTA time: {0} (must be > 0)")]
    InvalidTtaTime(usize),

    #[error("Invalid special augment probability: {0} (must be in [0.0, 1.0])")]
    InvalidAugmentProb(f32),

    #[error("Invalid snapmix alpha: {0} (must be > 0.0)")]
    InvalidSnapmixAlpha(f32),

    #[error("Invalid num_layer: {0} (must be >= 2)")]
    InvalidNumLayer(usize),

    #[error("Device list cannot be empty")]
    EmptyDeviceList,

    #[error("Invalid number of classes: {0} (must be > 0)")]
    InvalidNumClasses(usize),

    #[error("Invalid EMA decay: {0} (must be in (0.0, 1.0))")]
    InvalidEmaDecay(f32),

    #[error("Invalid learning rate: {0} (must be > 0.0 and <= 1.0)")]
    InvalidLearningRate(f32),

    #[error("Invalid optimizer: {0} (must be: sgd)")]
    InvalidOptimizer(String),

    #[error("Invalid SAM rho: {0} (must be > 0.0)")]
    InvalidRho(f32),

    #[error("Invalid momentum: {0} (must be in [0.0, 1.0))")]
    InvalidMomentum(f32),

    #[error("Invalid step decay: step_size {step_size}, gamma {gamma} (need step_size > 0 and gamma in (0.0, 1.0])")]
    InvalidStepDecay { step_size: usize, gamma: f32 },

    #[error("Invalid temperatures: t1 {t1}, t2 {t2} (need 0 < t1 < 2 and t2 > 0)")]
    InvalidTemperatures { t1: f32, t2: f32 },

    #[error("Invalid label smoothing: {0} (must be in [0.0, 1.0))")]
    InvalidLabelSmoothing(f32),
}
