//! Inspect command implementation

use crate::cli::logging::log;
use crate::cli::LogLevel;
use crate::config::{InspectArgs, OutputFormat};
use crate::io::Checkpoint;
use serde::Serialize;

/// Condensed view of a checkpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckpointSummary {
    pub start_epoch: usize,
    pub saved_at: String,
    pub tensors: usize,
    pub elements: usize,
    pub optimizer: String,
    pub lr: f32,
    pub scheduler: String,
    pub scheduler_epoch: usize,
    pub ema_updates: Option<u64>,
}

impl CheckpointSummary {
    pub fn from_checkpoint(checkpoint: &Checkpoint) -> Self {
        let mut optimizer = checkpoint.optimizer_state_dict.name.clone();
        if let Some(inner) = &checkpoint.optimizer_state_dict.inner {
            optimizer = format!("{optimizer}/{}", inner.name);
        }
        Self {
            start_epoch: checkpoint.start_epoch,
            saved_at: checkpoint.saved_at.to_rfc3339(),
            tensors: checkpoint.tensor_count(),
            elements: checkpoint.model_state_dict.values().map(|t| t.len()).sum(),
            optimizer,
            lr: checkpoint.optimizer_state_dict.lr,
            scheduler: checkpoint.lr_scheduler_state_dict.name.clone(),
            scheduler_epoch: checkpoint.lr_scheduler_state_dict.last_epoch,
            ema_updates: checkpoint.ema_updates,
        }
    }

    fn to_text(&self) -> String {
        let mut lines = vec![
            format!("  Start epoch: {}", self.start_epoch),
            format!("  Saved at: {}", self.saved_at),
            format!("  Tensors: {} ({} elements)", self.tensors, self.elements),
            format!("  Optimizer: {} (lr {})", self.optimizer, self.lr),
            format!(
                "  Scheduler: {} (epoch {})",
                self.scheduler, self.scheduler_epoch
            ),
        ];
        if let Some(updates) = self.ema_updates {
            lines.push(format!("  EMA updates: {updates}"));
        }
        lines.join("\n")
    }

    pub fn render(&self, format: OutputFormat) -> Result<String, String> {
        match format {
            OutputFormat::Text => Ok(self.to_text()),
            OutputFormat::Json => {
                serde_json::to_string_pretty(self).map_err(|e| format!("JSON error: {e}"))
            }
            OutputFormat::Yaml => serde_yaml::to_string(self).map_err(|e| format!("YAML error: {e}")),
        }
    }
}

pub fn run_inspect(args: InspectArgs, level: LogLevel) -> Result<(), String> {
    log(
        level,
        LogLevel::Normal,
        &format!("Inspecting checkpoint: {}", args.checkpoint.display()),
    );

    let checkpoint = Checkpoint::load(&args.checkpoint).map_err(|e| e.to_string())?;
    let rendered = CheckpointSummary::from_checkpoint(&checkpoint).render(args.format)?;
    if level != LogLevel::Quiet {
        println!("{rendered}");
    }
    Ok(())
}
