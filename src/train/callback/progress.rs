//! Progress callback for console output

use super::traits::{CallbackAction, CallbackContext, TrainerCallback};

/// Prints epoch headers, per-pass evaluation and epoch summaries to stdout
#[derive(Clone, Debug, Default)]
pub struct ProgressCallback {
    /// Also print every training step
    log_steps: bool,
}

impl ProgressCallback {
    /// Create progress callback
    pub fn new() -> Self {
        Self::default()
    }

    /// Print a line per training batch as well
    pub fn with_steps(mut self) -> Self {
        self.log_steps = true;
        self
    }

    fn epoch_header(ctx: &CallbackContext) -> String {
        let title = format!("epoch {:2}/{:2}", ctx.epoch, ctx.max_epochs);
        format!("{title}\n{}", "-".repeat(title.len()))
    }

    fn tta_line(ctx: &CallbackContext) -> String {
        format!(
            "eval - TTA loss: {:.4} acc: {:.4}",
            ctx.eval_loss.unwrap_or_default(),
            ctx.eval_accuracy.unwrap_or_default()
        )
    }

    fn summary_lines(ctx: &CallbackContext) -> String {
        format!(
            "train - loss: {:.4}\neval - epoch loss: {:.4} acc: {:.4} lr: {:.9}",
            ctx.loss,
            ctx.eval_loss.unwrap_or_default(),
            ctx.eval_accuracy.unwrap_or_default(),
            ctx.lr
        )
    }
}

impl TrainerCallback for ProgressCallback {
    fn on_train_begin(&mut self, ctx: &CallbackContext) -> CallbackAction {
        println!("Epochs: {}", ctx.max_epochs);
        CallbackAction::Continue
    }

    fn on_epoch_begin(&mut self, ctx: &CallbackContext) -> CallbackAction {
        println!("{}", Self::epoch_header(ctx));
        CallbackAction::Continue
    }

    fn on_step_end(&mut self, ctx: &CallbackContext) -> CallbackAction {
        if self.log_steps {
            println!("  step {}: loss {:.4}", ctx.step, ctx.loss);
        }
        CallbackAction::Continue
    }

    fn on_tta_pass(&mut self, ctx: &CallbackContext) {
        println!("{}", Self::tta_line(ctx));
    }

    fn on_epoch_end(&mut self, ctx: &CallbackContext) -> CallbackAction {
        println!("{}", Self::summary_lines(ctx));
        CallbackAction::Continue
    }

    fn on_train_end(&mut self, ctx: &CallbackContext) {
        println!(
            "Finish: - Best Epoch: {} - Best accuracy: {}",
            ctx.best_epoch, ctx.best_accuracy
        );
    }

    fn name(&self) -> &'static str {
        "ProgressCallback"
    }
}
