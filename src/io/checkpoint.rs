//! Per-epoch checkpoint bundles
//!
//! One JSON file per epoch at `{save_path}_epoch-{N}.pt`. Files are never
//! overwritten by later epochs and never deleted.

use crate::model::StateDict;
use crate::optim::{OptimizerState, SchedulerState};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Path of the checkpoint written after `epoch`
pub fn checkpoint_path(save_path: &Path, epoch: usize) -> PathBuf {
    PathBuf::from(format!("{}_epoch-{}.pt", save_path.display(), epoch))
}

/// Everything needed to resume a run after a completed epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// EMA shadow weights when EMA is configured, otherwise the live model
    pub model_state_dict: StateDict,
    pub optimizer_state_dict: OptimizerState,
    pub lr_scheduler_state_dict: SchedulerState,
    /// Epoch a resumed run starts at
    pub start_epoch: usize,
    /// EMA update count, so a resumed shadow keeps its decay ramp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ema_updates: Option<u64>,
    pub saved_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(
        model_state_dict: StateDict,
        optimizer_state_dict: OptimizerState,
        lr_scheduler_state_dict: SchedulerState,
        start_epoch: usize,
    ) -> Self {
        Self {
            model_state_dict,
            optimizer_state_dict,
            lr_scheduler_state_dict,
            start_epoch,
            ema_updates: None,
            saved_at: Utc::now(),
        }
    }

    pub fn with_ema_updates(mut self, updates: u64) -> Self {
        self.ema_updates = Some(updates);
        self
    }

    /// Write the checkpoint, creating missing parent directories
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(&mut writer, self)
            .map_err(|e| Error::Serialization(format!("JSON serialization failed: {e}")))?;
        writer.flush()?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            Error::Checkpoint(format!("Failed to open {}: {e}", path.display()))
        })?;
        serde_json::from_reader(BufReader::new(file)).map_err(|e| {
            Error::Checkpoint(format!("Failed to parse {}: {e}", path.display()))
        })
    }

    /// Number of tensors in the model state
    pub fn tensor_count(&self) -> usize {
        self.model_state_dict.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{ArrayD, IxDyn};
    use tempfile::TempDir;

    fn sample(start_epoch: usize) -> Checkpoint {
        let mut state = StateDict::new();
        state.insert("fc.weight".to_string(), ArrayD::from_elem(IxDyn(&[2, 3]), 0.5));
        state.insert("fc.bias".to_string(), ArrayD::zeros(IxDyn(&[2])));
        Checkpoint::new(
            state,
            OptimizerState::new("sam", 0.01),
            SchedulerState {
                name: "step_decay".to_string(),
                last_epoch: start_epoch - 1,
                params: Default::default(),
            },
            start_epoch,
        )
    }

    #[test]
    fn test_checkpoint_path_format() {
        let path = checkpoint_path(Path::new("out/model"), 7);
        assert_eq!(path, PathBuf::from("out/model_epoch-7.pt"));
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = checkpoint_path(&dir.path().join("nested/run"), 3);
        let ckpt = sample(4).with_ema_updates(120);

        ckpt.save(&path).unwrap();
        let loaded = Checkpoint::load(&path).unwrap();

        assert_eq!(loaded, ckpt);
        assert_eq!(loaded.start_epoch, 4);
        assert_eq!(loaded.tensor_count(), 2);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = Checkpoint::load(dir.path().join("absent.pt")).unwrap_err();
        assert!(matches!(err, Error::Checkpoint(_)));
    }

    #[test]
    fn test_load_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.pt");
        fs::write(&path, "not json").unwrap();
        assert!(Checkpoint::load(&path).is_err());
    }
}
