//! Configuration validation logic
//!
//! Validates run specifications for correctness before execution.

use super::error::ValidationError;
use crate::config::schema::{RunSpec, SchedulerSpec};

/// Validate a run specification
///
/// Checks:
/// - Epoch range and TTA count are usable
/// - Probabilities, coefficients and temperatures are in range
/// - Enums match allowed values
pub fn validate_config(spec: &RunSpec) -> Result<(), ValidationError> {
    let training = &spec.training;

    if training.num_epoch == 0 {
        return Err(ValidationError::InvalidEpochs(training.num_epoch));
    }

    // A resumed run may start one past the end and then do nothing
    if training.start_epoch == 0 || training.start_epoch > training.num_epoch + 1 {
        return Err(ValidationError::InvalidStartEpoch {
            start: training.start_epoch,
            max: training.num_epoch + 1,
        });
    }

    if training.tta_time == 0 {
        return Err(ValidationError::InvalidTtaTime(training.tta_time));
    }

    if !(0.0..=1.0).contains(&training.special_augment_prob) {
        return Err(ValidationError::InvalidAugmentProb(
            training.special_augment_prob,
        ));
    }

    if training.snapmix_alpha.is_nan() || training.snapmix_alpha <= 0.0 {
        return Err(ValidationError::InvalidSnapmixAlpha(training.snapmix_alpha));
    }

    if training.num_layer < 2 {
        return Err(ValidationError::InvalidNumLayer(training.num_layer));
    }

    if training.device_ids.is_empty() {
        return Err(ValidationError::EmptyDeviceList);
    }

    if spec.model.num_classes == 0 {
        return Err(ValidationError::InvalidNumClasses(spec.model.num_classes));
    }

    if let Some(decay) = spec.model.ema_decay {
        if !(decay > 0.0 && decay < 1.0) {
            return Err(ValidationError::InvalidEmaDecay(decay));
        }
    }

    let optimizer = &spec.optimizer;
    if optimizer.name != "sgd" {
        return Err(ValidationError::InvalidOptimizer(optimizer.name.clone()));
    }
    if !(optimizer.lr > 0.0 && optimizer.lr <= 1.0) {
        return Err(ValidationError::InvalidLearningRate(optimizer.lr));
    }
    if !(0.0..1.0).contains(&optimizer.momentum) {
        return Err(ValidationError::InvalidMomentum(optimizer.momentum));
    }
    if optimizer.rho.is_nan() || optimizer.rho <= 0.0 {
        return Err(ValidationError::InvalidRho(optimizer.rho));
    }

    if let SchedulerSpec::StepDecay { step_size, gamma } = spec.scheduler {
        if step_size == 0 || !(gamma > 0.0 && gamma <= 1.0) {
            return Err(ValidationError::InvalidStepDecay { step_size, gamma });
        }
    }

    let loss = &spec.loss;
    if !(loss.t1 > 0.0 && loss.t1 < 2.0) || loss.t2.is_nan() || loss.t2 <= 0.0 {
        return Err(ValidationError::InvalidTemperatures {
            t1: loss.t1,
            t2: loss.t2,
        });
    }
    if !(0.0..1.0).contains(&loss.label_smoothing) {
        return Err(ValidationError::InvalidLabelSmoothing(loss.label_smoothing));
    }

    Ok(())
}
