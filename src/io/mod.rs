//! Checkpoint persistence

mod checkpoint;

pub use checkpoint::{checkpoint_path, Checkpoint};
