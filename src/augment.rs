//! Batch mixing augmentations
//!
//! The mixing algorithms themselves are supplied by the caller through
//! [`MixAugment`]. This module fixes their output contract and how each
//! output turns into a training loss and the gradient w.r.t. the logits.

use crate::train::LossFn;
use crate::{Error, Result};
use ndarray::{Array1, Array2, Array4};

/// SnapMix output: per-sample mixing weights for both label sets
#[derive(Debug, Clone)]
pub struct SnapMixBatch {
    pub images: Array4<f32>,
    pub labels_a: Array1<usize>,
    pub labels_b: Array1<usize>,
    pub lam_a: Array1<f32>,
    pub lam_b: Array1<f32>,
}

/// CutMix output: one scalar mixing weight for the whole batch
#[derive(Debug, Clone)]
pub struct CutMixBatch {
    pub images: Array4<f32>,
    pub labels_a: Array1<usize>,
    pub labels_b: Array1<usize>,
    pub lam: f32,
}

/// Mixing augmentations applied to a training batch
///
/// `snapmix` may run the model to build its semantic maps.
pub trait MixAugment<M: ?Sized> {
    fn snapmix(
        &mut self,
        images: &Array4<f32>,
        labels: &Array1<usize>,
        alpha: f32,
        model: &mut M,
    ) -> Result<SnapMixBatch>;

    fn cutmix(&mut self, images: &Array4<f32>, labels: &Array1<usize>) -> Result<CutMixBatch>;
}

/// Mixer that leaves batches untouched
///
/// Snapmix output pairs every image with its own label at full weight and
/// cutmix output uses `lam = 1`, so both paths reduce to plain supervised
/// training. Used by the demo run and as a baseline.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThroughMix;

impl<M: ?Sized> MixAugment<M> for PassThroughMix {
    fn snapmix(
        &mut self,
        images: &Array4<f32>,
        labels: &Array1<usize>,
        _alpha: f32,
        _model: &mut M,
    ) -> Result<SnapMixBatch> {
        let n = labels.len();
        Ok(SnapMixBatch {
            images: images.clone(),
            labels_a: labels.clone(),
            labels_b: labels.clone(),
            lam_a: Array1::ones(n),
            lam_b: Array1::zeros(n),
        })
    }

    fn cutmix(&mut self, images: &Array4<f32>, labels: &Array1<usize>) -> Result<CutMixBatch> {
        Ok(CutMixBatch {
            images: images.clone(),
            labels_a: labels.clone(),
            labels_b: labels.clone(),
            lam: 1.0,
        })
    }
}

/// Which augmentation ran for a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AugmentPath {
    Snapmix,
    Cutmix,
}

/// A mixed batch from either path
#[derive(Debug, Clone)]
pub enum MixedBatch {
    Snapmix(SnapMixBatch),
    Cutmix(CutMixBatch),
}

impl MixedBatch {
    pub fn path(&self) -> AugmentPath {
        match self {
            MixedBatch::Snapmix(_) => AugmentPath::Snapmix,
            MixedBatch::Cutmix(_) => AugmentPath::Cutmix,
        }
    }

    pub fn images(&self) -> &Array4<f32> {
        match self {
            MixedBatch::Snapmix(b) => &b.images,
            MixedBatch::Cutmix(b) => &b.images,
        }
    }

    /// Labels counted toward the epoch loss denominator
    pub fn label_count(&self) -> usize {
        match self {
            MixedBatch::Snapmix(b) => b.labels_a.len(),
            MixedBatch::Cutmix(b) => b.labels_a.len(),
        }
    }

    /// Check that labels and mixing weights line up with the images
    pub fn validate(&self) -> Result<()> {
        let n = self.images().shape()[0];
        let lengths: Vec<(&str, usize)> = match self {
            MixedBatch::Snapmix(b) => vec![
                ("labels_a", b.labels_a.len()),
                ("labels_b", b.labels_b.len()),
                ("lam_a", b.lam_a.len()),
                ("lam_b", b.lam_b.len()),
            ],
            MixedBatch::Cutmix(b) => {
                vec![("labels_a", b.labels_a.len()), ("labels_b", b.labels_b.len())]
            }
        };
        for (what, len) in lengths {
            if len != n {
                return Err(Error::Augment(format!(
                    "{:?} produced {what} of length {len} for {n} images",
                    self.path()
                )));
            }
        }
        Ok(())
    }

    /// Batch loss and its gradient w.r.t. `logits`
    ///
    /// SnapMix: `mean(tempered(a) * lam_a + tempered(b) * lam_b)`.
    /// CutMix: `lam * mean(criterion(a)) + (1 - lam) * mean(criterion(b))`.
    pub fn loss_and_grad(
        &self,
        logits: &Array2<f32>,
        tempered: &dyn LossFn,
        criterion: &dyn LossFn,
    ) -> Result<(f32, Array2<f32>)> {
        let n = logits.nrows();
        if n == 0 {
            return Ok((0.0, Array2::zeros(logits.dim())));
        }
        let inv_n = 1.0 / n as f32;

        match self {
            MixedBatch::Snapmix(b) => {
                let loss_a = tempered.per_sample(logits, &b.labels_a)?;
                let loss_b = tempered.per_sample(logits, &b.labels_b)?;
                let loss = (&loss_a * &b.lam_a + &loss_b * &b.lam_b).sum() * inv_n;

                let grad = tempered.backward(logits, &b.labels_a, &(&b.lam_a * inv_n))?
                    + tempered.backward(logits, &b.labels_b, &(&b.lam_b * inv_n))?;
                Ok((loss, grad))
            }
            MixedBatch::Cutmix(b) => {
                let loss = b.lam * criterion.mean(logits, &b.labels_a)?
                    + (1.0 - b.lam) * criterion.mean(logits, &b.labels_b)?;

                let weights_a = Array1::from_elem(n, b.lam * inv_n);
                let weights_b = Array1::from_elem(n, (1.0 - b.lam) * inv_n);
                let grad = criterion.backward(logits, &b.labels_a, &weights_a)?
                    + criterion.backward(logits, &b.labels_b, &weights_b)?;
                Ok((loss, grad))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::train::{BiTemperedLoss, CrossEntropyLoss};
    use approx::assert_abs_diff_eq;
    use ndarray::{arr1, arr2};

    fn logits() -> Array2<f32> {
        arr2(&[[1.0, 0.0, -1.0], [0.5, 0.5, 2.0]])
    }

    fn snapmix() -> MixedBatch {
        MixedBatch::Snapmix(SnapMixBatch {
            images: Array4::zeros((2, 1, 1, 1)),
            labels_a: arr1(&[0, 2]),
            labels_b: arr1(&[1, 1]),
            lam_a: arr1(&[0.7, 0.4]),
            lam_b: arr1(&[0.3, 0.6]),
        })
    }

    #[test]
    fn test_snapmix_loss_is_weighted_mean() {
        let tempered = BiTemperedLoss::default();
        let (loss, _) = snapmix()
            .loss_and_grad(&logits(), &tempered, &CrossEntropyLoss)
            .unwrap();

        let a = tempered.per_sample(&logits(), &arr1(&[0, 2])).unwrap();
        let b = tempered.per_sample(&logits(), &arr1(&[1, 1])).unwrap();
        let expected = (a[0] * 0.7 + b[0] * 0.3 + a[1] * 0.4 + b[1] * 0.6) / 2.0;
        assert_abs_diff_eq!(loss, expected, epsilon = 1e-6);
    }

    #[test]
    fn test_cutmix_uses_injected_criterion() {
        let batch = MixedBatch::Cutmix(CutMixBatch {
            images: Array4::zeros((2, 1, 1, 1)),
            labels_a: arr1(&[0, 2]),
            labels_b: arr1(&[1, 1]),
            lam: 0.25,
        });
        let (loss, grad) = batch
            .loss_and_grad(&logits(), &BiTemperedLoss::default(), &CrossEntropyLoss)
            .unwrap();

        let ce_a = CrossEntropyLoss.mean(&logits(), &arr1(&[0, 2])).unwrap();
        let ce_b = CrossEntropyLoss.mean(&logits(), &arr1(&[1, 1])).unwrap();
        assert_abs_diff_eq!(loss, 0.25 * ce_a + 0.75 * ce_b, epsilon = 1e-6);
        // softmax gradients sum to zero per row
        for row in grad.rows() {
            assert_abs_diff_eq!(row.sum(), 0.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_label_count_and_path() {
        let batch = snapmix();
        assert_eq!(batch.label_count(), 2);
        assert_eq!(batch.path(), AugmentPath::Snapmix);
        assert!(batch.validate().is_ok());
    }

    #[test]
    fn test_pass_through_snapmix_equals_plain_loss() {
        let labels = arr1(&[0, 2]);
        let images = Array4::zeros((2, 1, 1, 1));
        let mut mix = PassThroughMix;
        let batch = MixAugment::<()>::snapmix(&mut mix, &images, &labels, 5.0, &mut ()).unwrap();
        let tempered = BiTemperedLoss::default();
        let (loss, _) = MixedBatch::Snapmix(batch)
            .loss_and_grad(&logits(), &tempered, &CrossEntropyLoss)
            .unwrap();
        let plain = tempered.mean(&logits(), &labels).unwrap();
        assert_abs_diff_eq!(loss, plain, epsilon = 1e-6);
    }

    #[test]
    fn test_pass_through_cutmix_full_weight() {
        let labels = arr1(&[1, 0]);
        let batch = MixAugment::<()>::cutmix(&mut PassThroughMix, &Array4::zeros((2, 1, 1, 1)), &labels)
            .unwrap();
        assert_eq!(batch.lam, 1.0);
        assert_eq!(batch.labels_b, labels);
    }

    #[test]
    fn test_validate_rejects_short_weights() {
        let batch = MixedBatch::Snapmix(SnapMixBatch {
            images: Array4::zeros((2, 1, 1, 1)),
            labels_a: arr1(&[0, 2]),
            labels_b: arr1(&[1, 1]),
            lam_a: arr1(&[0.7]),
            lam_b: arr1(&[0.3, 0.6]),
        });
        let err = batch.validate().unwrap_err();
        assert!(err.to_string().contains("lam_a"));
    }
}
