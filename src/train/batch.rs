//! Batch data structure and data loading

use crate::{Error, Result};
use ndarray::{Array1, Array4};

/// A batch of `(N, C, H, W)` images with one class label per image
#[derive(Debug, Clone)]
pub struct Batch {
    pub images: Array4<f32>,
    pub labels: Array1<usize>,
}

impl Batch {
    /// Create a new batch; images and labels must agree on `N`
    pub fn new(images: Array4<f32>, labels: Array1<usize>) -> Result<Self> {
        if images.shape()[0] != labels.len() {
            return Err(Error::ShapeMismatch(format!(
                "batch has {} images but {} labels",
                images.shape()[0],
                labels.len()
            )));
        }
        Ok(Self { images, labels })
    }

    /// Number of images in the batch
    pub fn size(&self) -> usize {
        self.images.shape()[0]
    }
}

/// Iterator over batches produced by a loader
pub type BatchIter<'a> = Box<dyn Iterator<Item = Result<Batch>> + 'a>;

/// Source of training and evaluation batches
///
/// Evaluation batches must come out in the same order on every pass, since
/// test-time augmentation averages predictions row by row.
pub trait DataLoaders {
    /// Training batches for `epoch`
    fn train_batches(&mut self, epoch: usize) -> BatchIter<'_>;

    /// Evaluation batches for TTA pass `pass` (0-based)
    fn eval_batches(&mut self, pass: usize) -> BatchIter<'_>;
}

/// In-memory loaders replaying fixed batch lists
#[derive(Debug, Clone, Default)]
pub struct VecLoaders {
    pub train: Vec<Batch>,
    pub eval: Vec<Batch>,
}

impl VecLoaders {
    pub fn new(train: Vec<Batch>, eval: Vec<Batch>) -> Self {
        Self { train, eval }
    }
}

impl DataLoaders for VecLoaders {
    fn train_batches(&mut self, _epoch: usize) -> BatchIter<'_> {
        Box::new(self.train.iter().cloned().map(Ok))
    }

    fn eval_batches(&mut self, _pass: usize) -> BatchIter<'_> {
        Box::new(self.eval.iter().cloned().map(Ok))
    }
}
