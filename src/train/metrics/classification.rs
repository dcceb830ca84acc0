//! Classification accuracy

use crate::{Error, Result};
use ndarray::{Array1, Array2, Axis};

/// Index of the largest score in each row; the first index wins ties
pub fn argmax_rows(scores: &Array2<f32>) -> Array1<usize> {
    scores
        .axis_iter(Axis(0))
        .map(|row| {
            row.iter()
                .enumerate()
                .fold((0, f32::NEG_INFINITY), |(best, best_v), (i, &v)| {
                    if v > best_v {
                        (i, v)
                    } else {
                        (best, best_v)
                    }
                })
                .0
        })
        .collect()
}

/// Fraction of predictions equal to the labels, 0.0 when there are none
///
/// # Example
///
/// ```
/// use afinar::train::{accuracy, argmax_rows};
/// use ndarray::{arr1, arr2};
///
/// let scores = arr2(&[[0.9, 0.1], [0.2, 0.8], [0.6, 0.4]]);
/// let acc = accuracy(&argmax_rows(&scores), &arr1(&[0, 1, 1])).unwrap();
/// assert!((acc - 2.0 / 3.0).abs() < 1e-12);
/// ```
pub fn accuracy(predictions: &Array1<usize>, labels: &Array1<usize>) -> Result<f64> {
    if predictions.len() != labels.len() {
        return Err(Error::ShapeMismatch(format!(
            "{} predictions for {} labels",
            predictions.len(),
            labels.len()
        )));
    }
    if labels.is_empty() {
        return Ok(0.0);
    }
    let correct = predictions
        .iter()
        .zip(labels.iter())
        .filter(|(p, l)| p == l)
        .count();
    Ok(correct as f64 / labels.len() as f64)
}
