//! Core traits and types for the callback system
//!
//! This module provides the foundational types for training callbacks:
//! - `CallbackContext` - State passed to callbacks
//! - `CallbackAction` - Actions a callback can request
//! - `TrainerCallback` - The trait all callbacks implement

/// Context passed to callbacks with current training state
#[derive(Clone, Debug)]
pub struct CallbackContext {
    /// Current epoch (1-based)
    pub epoch: usize,
    /// Last epoch of the run
    pub max_epochs: usize,
    /// Current step within epoch
    pub step: usize,
    /// Global step count
    pub global_step: usize,
    /// Current loss value: batch loss in step events, epoch train loss otherwise
    pub loss: f32,
    /// Current learning rate
    pub lr: f32,
    /// TTA pass (1-based) in `on_tta_pass`
    pub tta_pass: usize,
    /// TTA passes this epoch
    pub tta_time: usize,
    /// Evaluation loss (per pass in `on_tta_pass`, averaged at epoch end)
    pub eval_loss: Option<f32>,
    /// Evaluation accuracy, same scope as `eval_loss`
    pub eval_accuracy: Option<f64>,
    /// Best epoch so far
    pub best_epoch: usize,
    /// Best evaluation accuracy so far
    pub best_accuracy: f64,
    /// Training duration in seconds
    pub elapsed_secs: f64,
}

impl Default for CallbackContext {
    fn default() -> Self {
        Self {
            epoch: 0,
            max_epochs: 0,
            step: 0,
            global_step: 0,
            loss: 0.0,
            lr: 0.0,
            tta_pass: 0,
            tta_time: 0,
            eval_loss: None,
            eval_accuracy: None,
            best_epoch: 1,
            best_accuracy: 0.0,
            elapsed_secs: 0.0,
        }
    }
}

/// Action to take after a callback
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallbackAction {
    /// Continue training normally
    Continue,
    /// Stop training after the current epoch's checkpoint
    Stop,
}

/// Trait for training callbacks
///
/// Implement this trait to hook into training events. All methods have
/// default no-op implementations, so you only need to implement the
/// events you care about.
pub trait TrainerCallback: Send {
    /// Called before training starts
    fn on_train_begin(&mut self, _ctx: &CallbackContext) -> CallbackAction {
        CallbackAction::Continue
    }

    /// Called after training ends
    fn on_train_end(&mut self, _ctx: &CallbackContext) {}

    /// Called before each epoch
    fn on_epoch_begin(&mut self, _ctx: &CallbackContext) -> CallbackAction {
        CallbackAction::Continue
    }

    /// Called after each epoch, once its checkpoint is written
    fn on_epoch_end(&mut self, _ctx: &CallbackContext) -> CallbackAction {
        CallbackAction::Continue
    }

    /// Called after each training batch
    fn on_step_end(&mut self, _ctx: &CallbackContext) -> CallbackAction {
        CallbackAction::Continue
    }

    /// Called after each evaluation pass
    fn on_tta_pass(&mut self, _ctx: &CallbackContext) {}

    /// Get callback name for logging
    fn name(&self) -> &'static str {
        "TrainerCallback"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callback_context_default() {
        let ctx = CallbackContext::default();
        assert_eq!(ctx.epoch, 0);
        assert_eq!(ctx.loss, 0.0);
        assert_eq!(ctx.best_epoch, 1);
        assert!(ctx.eval_loss.is_none());
    }

    #[test]
    fn test_default_trainer_callback_impl() {
        struct MinimalCallback;
        impl TrainerCallback for MinimalCallback {
            fn name(&self) -> &'static str {
                "MinimalCallback"
            }
        }

        let mut cb = MinimalCallback;
        let ctx = CallbackContext::default();
        assert_eq!(cb.on_train_begin(&ctx), CallbackAction::Continue);
        assert_eq!(cb.on_epoch_begin(&ctx), CallbackAction::Continue);
        assert_eq!(cb.on_epoch_end(&ctx), CallbackAction::Continue);
        assert_eq!(cb.on_step_end(&ctx), CallbackAction::Continue);
        cb.on_tta_pass(&ctx);
        cb.on_train_end(&ctx);
        assert_eq!(cb.name(), "MinimalCallback");
    }
}
