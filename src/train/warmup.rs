//! Freeze/unfreeze warm-up schedule
//!
//! For the first `warm_up` epochs only the classifier head trains: the first
//! `num_layer - 2` parameters stop tracking gradients and every normalization
//! layer is frozen in inference mode. The epoch after warm-up releases
//! everything; later epochs leave the model alone but keep the steady TTA
//! count, so a run resumed past warm-up evaluates like an uninterrupted one.

use crate::config::TrainingParams;
use crate::model::ImageClassifier;
use tracing::info;

/// TTA passes while the backbone is frozen
pub const WARMUP_TTA_TIME: usize = 1;

/// TTA passes once the backbone is released
pub const STEADY_TTA_TIME: usize = 5;

/// Parameters at the end of the inventory that keep training during warm-up
const TRAINABLE_TAIL: usize = 2;

/// Warm-up state of an epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarmupPhase {
    /// `epoch <= warm_up`
    Frozen,
    /// `epoch == warm_up + 1`
    Unfrozen,
    /// `epoch > warm_up + 1`
    Steady,
}

impl WarmupPhase {
    pub fn for_epoch(epoch: usize, warm_up: usize) -> Self {
        if epoch <= warm_up {
            WarmupPhase::Frozen
        } else if epoch == warm_up + 1 {
            WarmupPhase::Unfrozen
        } else {
            WarmupPhase::Steady
        }
    }
}

/// Outcome of applying the schedule for one epoch
#[derive(Debug, Clone, PartialEq)]
pub struct WarmupTransition {
    pub phase: WarmupPhase,
    /// Configuration to use from this epoch on
    pub config: TrainingParams,
}

/// Applies the warm-up schedule at the start of each epoch
pub struct WarmupSchedule;

impl WarmupSchedule {
    /// Reconfigure `model` for `epoch` and return the configuration to train with
    ///
    /// Frozen epochs are idempotent, so resuming in the middle of warm-up
    /// re-applies the freeze. A run whose first epoch is already past
    /// `warm_up + 1` never freezes.
    pub fn apply<M: ImageClassifier + ?Sized>(
        epoch: usize,
        config: &TrainingParams,
        model: &mut M,
    ) -> WarmupTransition {
        let phase = WarmupPhase::for_epoch(epoch, config.warm_up);
        let config = match phase {
            WarmupPhase::Frozen => {
                let inventory = model.inventory_mut();
                inventory.freeze_leading(config.num_layer.saturating_sub(TRAINABLE_TAIL));
                inventory.set_norm_frozen(true);
                info!(
                    epoch,
                    trainable = inventory.trainable_indices().len(),
                    "warm-up: backbone frozen"
                );
                config.with_tta_time(WARMUP_TTA_TIME)
            }
            WarmupPhase::Unfrozen => {
                let inventory = model.inventory_mut();
                inventory.set_requires_grad_all(true);
                inventory.set_norm_frozen(false);
                info!(epoch, "warm-up finished: all parameters trainable");
                config.with_tta_time(STEADY_TTA_TIME)
            }
            WarmupPhase::Steady => config.with_tta_time(STEADY_TTA_TIME),
        };
        WarmupTransition { phase, config }
    }
}
