//! Evaluation with test-time augmentation
//!
//! Each pass runs the whole evaluation set through the model in inference
//! mode. Per-pass log-softmax outputs are summed row by row and divided by the
//! pass count; the epoch loss and accuracy come from that average, never from
//! a single pass.

use super::batch::DataLoaders;
use super::loss::{log_softmax_rows, LossFn};
use super::metrics::{accuracy, argmax_rows};
use crate::model::ImageClassifier;
use crate::{Error, Result};
use ndarray::{Array1, Array2};
use tracing::debug;

/// Elementwise sum of per-pass prediction matrices
#[derive(Debug, Clone, Default)]
pub struct TtaAccumulator {
    sum: Option<Array2<f64>>,
    passes: usize,
}

impl TtaAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one pass; every pass must have the same shape
    pub fn add(&mut self, predictions: &Array2<f32>) -> Result<()> {
        let widened = predictions.mapv(f64::from);
        match self.sum.as_mut() {
            Some(sum) => {
                if sum.dim() != widened.dim() {
                    return Err(Error::ShapeMismatch(format!(
                        "TTA pass {} produced {:?} predictions, earlier passes {:?}",
                        self.passes + 1,
                        widened.dim(),
                        sum.dim()
                    )));
                }
                *sum += &widened;
            }
            None => self.sum = Some(widened),
        }
        self.passes += 1;
        Ok(())
    }

    pub fn passes(&self) -> usize {
        self.passes
    }

    /// Mean over the passes added so far, `None` before the first pass
    pub fn average(&self) -> Option<Array2<f32>> {
        let sum = self.sum.as_ref()?;
        let n = self.passes as f64;
        Some(sum.mapv(|v| (v / n) as f32))
    }
}

/// Metrics of a single TTA pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PassReport {
    pub loss: f32,
    pub accuracy: f64,
}

/// Result of a full TTA evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct EvalReport {
    /// Tempered loss of the averaged predictions
    pub loss: f32,
    /// Accuracy of the averaged predictions
    pub accuracy: f64,
    pub passes: Vec<PassReport>,
}

/// Outputs of one pass over the evaluation set
struct PassOutput {
    log_probs: Array2<f32>,
    labels: Array1<usize>,
    report: PassReport,
}

fn run_pass<M: ImageClassifier + ?Sized>(
    model: &mut M,
    loaders: &mut dyn DataLoaders,
    pass: usize,
    tempered: &dyn LossFn,
) -> Result<PassOutput> {
    let classes = model.num_classes();
    let mut rows: Vec<f32> = Vec::new();
    let mut labels: Vec<usize> = Vec::new();
    let mut loss_mass = 0.0f64;

    for batch in loaders.eval_batches(pass) {
        let batch = batch?;
        let output = model.forward(&batch.images, Some(false))?;
        if output.logits.ncols() != classes {
            return Err(Error::ShapeMismatch(format!(
                "model produced {} outputs, expected {classes}",
                output.logits.ncols()
            )));
        }
        let per_sample = tempered.per_sample(&output.logits, &batch.labels)?;
        loss_mass += per_sample.iter().map(|&l| f64::from(l)).sum::<f64>();
        rows.extend(log_softmax_rows(&output.logits).iter());
        labels.extend(batch.labels.iter());
    }

    let log_probs = Array2::from_shape_vec((labels.len(), classes), rows)?;
    let labels = Array1::from(labels);
    let loss = if labels.is_empty() {
        0.0
    } else {
        (loss_mass / labels.len() as f64) as f32
    };
    let acc = accuracy(&argmax_rows(&log_probs), &labels)?;
    Ok(PassOutput {
        log_probs,
        labels,
        report: PassReport {
            loss,
            accuracy: acc,
        },
    })
}

/// Run `tta_time` inference passes and score the averaged predictions
///
/// Final accuracy is checked against the labels of the last pass, so the
/// loaders must yield evaluation rows in the same order on every pass.
pub fn evaluate_tta<M: ImageClassifier + ?Sized>(
    model: &mut M,
    loaders: &mut dyn DataLoaders,
    tta_time: usize,
    tempered: &dyn LossFn,
) -> Result<EvalReport> {
    if tta_time == 0 {
        return Err(Error::ConfigError("tta_time must be at least 1".into()));
    }
    model.set_training(false);

    let mut accumulator = TtaAccumulator::new();
    let mut passes = Vec::with_capacity(tta_time);
    let mut labels = Array1::from(Vec::new());

    for pass in 0..tta_time {
        let output = run_pass(model, loaders, pass, tempered)?;
        debug!(
            pass = pass + 1,
            loss = output.report.loss,
            accuracy = output.report.accuracy,
            "TTA pass"
        );
        accumulator.add(&output.log_probs)?;
        passes.push(output.report);
        labels = output.labels;
    }

    let averaged = accumulator
        .average()
        .unwrap_or_else(|| Array2::zeros((0, model.num_classes())));
    let loss = tempered.mean(&averaged, &labels)?;
    let accuracy = accuracy(&argmax_rows(&averaged), &labels)?;
    Ok(EvalReport {
        loss,
        accuracy,
        passes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NormLinearClassifier;
    use crate::train::batch::{Batch, VecLoaders};
    use crate::train::{BiTemperedLoss, CrossEntropyLoss};
    use approx::assert_abs_diff_eq;
    use ndarray::{arr1, arr2, Array4};
    use proptest::prelude::*;

    fn loaders(n_batches: usize) -> VecLoaders {
        let eval = (0..n_batches)
            .map(|b| {
                let images = Array4::from_shape_fn((3, 1, 2, 2), |(i, _, h, w)| {
                    ((b * 3 + i) as f32 - 4.0) * 0.3 + (h * 2 + w) as f32 * 0.1
                });
                Batch::new(images, arr1(&[0, 1, 2])).unwrap()
            })
            .collect();
        VecLoaders::new(Vec::new(), eval)
    }

    #[test]
    fn test_accumulator_averages() {
        let mut acc = TtaAccumulator::new();
        acc.add(&arr2(&[[1.0, 3.0]])).unwrap();
        acc.add(&arr2(&[[3.0, 1.0]])).unwrap();
        assert_eq!(acc.passes(), 2);
        assert_eq!(acc.average().unwrap(), arr2(&[[2.0, 2.0]]));
    }

    #[test]
    fn test_accumulator_rejects_shape_change() {
        let mut acc = TtaAccumulator::new();
        acc.add(&arr2(&[[1.0, 3.0]])).unwrap();
        assert!(acc.add(&arr2(&[[1.0, 3.0], [0.0, 0.0]])).is_err());
    }

    #[test]
    fn test_evaluate_tta_passes_and_eval_mode() {
        let mut model = NormLinearClassifier::new(4, 3, 1).unwrap();
        let mut data = loaders(2);
        let report = evaluate_tta(&mut model, &mut data, 3, &BiTemperedLoss::default()).unwrap();

        assert_eq!(report.passes.len(), 3);
        assert!(!model.is_training());
        // deterministic passes: the average equals any single pass
        assert_abs_diff_eq!(report.accuracy, report.passes[0].accuracy, epsilon = 1e-12);
    }

    #[test]
    fn test_evaluate_tta_loss_recomputed_on_average() {
        let mut model = NormLinearClassifier::new(4, 3, 1).unwrap();
        let mut data = loaders(1);
        let report = evaluate_tta(&mut model, &mut data, 1, &CrossEntropyLoss).unwrap();

        // cross-entropy of log-softmax equals cross-entropy of the raw logits
        assert_abs_diff_eq!(report.loss, report.passes[0].loss, epsilon = 1e-5);
    }

    #[test]
    fn test_evaluate_tta_empty_eval_set() {
        let mut model = NormLinearClassifier::new(4, 3, 1).unwrap();
        let mut data = VecLoaders::default();
        let report = evaluate_tta(&mut model, &mut data, 2, &CrossEntropyLoss).unwrap();
        assert_eq!(report.loss, 0.0);
        assert_eq!(report.accuracy, 0.0);
    }

    #[test]
    fn test_evaluate_tta_rejects_zero_passes() {
        let mut model = NormLinearClassifier::new(4, 3, 1).unwrap();
        assert!(evaluate_tta(&mut model, &mut loaders(1), 0, &CrossEntropyLoss).is_err());
    }

    fn pass_strategy() -> impl Strategy<Value = Vec<Vec<i8>>> {
        // integer-valued log-probs keep the f64 sums exact
        proptest::collection::vec(proptest::collection::vec(-20i8..0, 8 * 4), 1..6)
    }

    proptest! {
        #[test]
        fn prop_accuracy_independent_of_pass_order(
            passes in pass_strategy(),
            labels in proptest::collection::vec(0usize..4, 8),
            rotate in 0usize..6,
        ) {
            let matrices: Vec<Array2<f32>> = passes
                .iter()
                .map(|p| Array2::from_shape_vec((8, 4), p.iter().map(|&v| f32::from(v)).collect()).unwrap())
                .collect();
            let labels = Array1::from(labels);

            let score = |order: &[Array2<f32>]| {
                let mut acc = TtaAccumulator::new();
                for m in order {
                    acc.add(m).unwrap();
                }
                accuracy(&argmax_rows(&acc.average().unwrap()), &labels).unwrap()
            };

            let forward = score(&matrices);
            let mut reversed = matrices.clone();
            reversed.reverse();
            let mut rotated = matrices.clone();
            let len = rotated.len();
            rotated.rotate_left(rotate % len);

            prop_assert_eq!(forward, score(&reversed));
            prop_assert_eq!(forward, score(&rotated));
        }
    }
}
