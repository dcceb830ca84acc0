//! Bi-tempered logistic loss
//!
//! A logistic loss with two temperatures: `t1 < 1` bounds the loss so mislabeled
//! samples far from the decision boundary stop dominating, and `t2 > 1` gives the
//! tempered softmax a heavier tail so samples near the boundary are not
//! over-penalized. With `t1 = t2 = 1` it reduces to softmax cross-entropy.
//!
//! Arithmetic runs in f64; the results are narrowed to f32 at the boundary.

use super::{check_targets, check_weights, LossFn};
use crate::{Error, Result};
use ndarray::{Array1, Array2, ArrayView1, Axis};

const UNIT_TEMPERATURE_EPS: f64 = 1e-9;
const LABEL_LOG_EPS: f64 = 1e-10;
const MIN_BISECTION_ITERS: usize = 30;

fn is_unit(t: f64) -> bool {
    (t - 1.0).abs() < UNIT_TEMPERATURE_EPS
}

/// Tempered logarithm: `(u^(1-t) - 1) / (1 - t)`, `ln(u)` at `t = 1`
pub fn log_t(u: f64, t: f64) -> f64 {
    if is_unit(t) {
        u.ln()
    } else {
        (u.powf(1.0 - t) - 1.0) / (1.0 - t)
    }
}

/// Tempered exponential: `[1 + (1 - t) u]_+^(1 / (1 - t))`, `exp(u)` at `t = 1`
pub fn exp_t(u: f64, t: f64) -> f64 {
    if is_unit(t) {
        u.exp()
    } else {
        (1.0 + (1.0 - t) * u).max(0.0).powf(1.0 / (1.0 - t))
    }
}

/// Normalization constant for `t > 1` by fixed-point iteration
fn normalization_fixed_point(activations: &[f64], t: f64, num_iters: usize) -> f64 {
    let mu = activations.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let shifted: Vec<f64> = activations.iter().map(|&a| a - mu).collect();
    let mut normalized = shifted.clone();

    for _ in 0..num_iters {
        let partition: f64 = normalized.iter().map(|&a| exp_t(a, t)).sum();
        let factor = partition.powf(1.0 - t);
        for (n, &s) in normalized.iter_mut().zip(&shifted) {
            *n = s * factor;
        }
    }

    let partition: f64 = normalized.iter().map(|&a| exp_t(a, t)).sum();
    -log_t(1.0 / partition, t) + mu
}

/// Normalization constant for `t < 1` by bisection
fn normalization_bisection(activations: &[f64], t: f64, num_iters: usize) -> f64 {
    let mu = activations.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let shifted: Vec<f64> = activations.iter().map(|&a| a - mu).collect();
    let cutoff = -1.0 / (1.0 - t);
    let effective_dim = shifted.iter().filter(|&&s| s > cutoff).count().max(1) as f64;

    let mut lower = 0.0;
    let mut upper = -log_t(1.0 / effective_dim, t);
    for _ in 0..num_iters.max(MIN_BISECTION_ITERS) {
        let partition = (upper + lower) / 2.0;
        let total: f64 = shifted.iter().map(|&s| exp_t(s - partition, t)).sum();
        if total < 1.0 {
            upper = partition;
        } else {
            lower = partition;
        }
    }
    (upper + lower) / 2.0 + mu
}

/// Tempered softmax of one row of activations
pub fn tempered_softmax(activations: &[f64], t: f64, num_iters: usize) -> Vec<f64> {
    if activations.is_empty() {
        return Vec::new();
    }
    let normalization = if is_unit(t) {
        let mu = activations.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        mu + activations.iter().map(|&a| (a - mu).exp()).sum::<f64>().ln()
    } else if t > 1.0 {
        normalization_fixed_point(activations, t, num_iters)
    } else {
        normalization_bisection(activations, t, num_iters)
    };
    activations
        .iter()
        .map(|&a| exp_t(a - normalization, t))
        .collect()
}

/// Bi-tempered logistic loss over hard targets with optional label smoothing
///
/// # Example
///
/// ```
/// use afinar::train::{BiTemperedLoss, LossFn};
/// use ndarray::{arr1, arr2};
///
/// let loss = BiTemperedLoss::default();
/// let value = loss.mean(&arr2(&[[3.0, 0.0, -1.0]]), &arr1(&[0])).unwrap();
/// assert!(value >= 0.0);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct BiTemperedLoss {
    t1: f64,
    t2: f64,
    label_smoothing: f64,
    num_iters: usize,
}

impl BiTemperedLoss {
    /// Create a loss with temperatures `t1` (boundedness) and `t2` (tail heaviness)
    pub fn new(t1: f32, t2: f32) -> Result<Self> {
        if !(t1 > 0.0 && t1 < 2.0) {
            return Err(Error::ConfigError(format!("t1 must lie in (0, 2), got {t1}")));
        }
        if t2 <= 0.0 {
            return Err(Error::ConfigError(format!("t2 must be positive, got {t2}")));
        }
        Ok(Self {
            t1: f64::from(t1),
            t2: f64::from(t2),
            label_smoothing: 0.0,
            num_iters: 5,
        })
    }

    /// Spread `smoothing` of the target mass over the other classes
    pub fn with_label_smoothing(mut self, smoothing: f32) -> Self {
        self.label_smoothing = f64::from(smoothing.clamp(0.0, 1.0));
        self
    }

    /// Iterations used to find the tempered softmax normalization
    pub fn with_num_iters(mut self, num_iters: usize) -> Self {
        self.num_iters = num_iters.max(1);
        self
    }

    pub fn t1(&self) -> f32 {
        self.t1 as f32
    }

    pub fn t2(&self) -> f32 {
        self.t2 as f32
    }

    fn soft_labels(&self, target: usize, classes: usize) -> Vec<f64> {
        let mut labels = vec![0.0; classes];
        labels[target] = 1.0;
        if self.label_smoothing > 0.0 && classes > 1 {
            let k = classes as f64;
            let keep = 1.0 - self.label_smoothing * k / (k - 1.0);
            let spread = self.label_smoothing / (k - 1.0);
            for y in &mut labels {
                *y = keep * *y + spread;
            }
        }
        labels
    }

    fn probabilities(&self, row: ArrayView1<'_, f32>) -> Vec<f64> {
        let activations: Vec<f64> = row.iter().map(|&a| f64::from(a)).collect();
        tempered_softmax(&activations, self.t2, self.num_iters)
    }

    fn row_loss(&self, probs: &[f64], labels: &[f64]) -> f64 {
        let t1 = self.t1;
        probs
            .iter()
            .zip(labels)
            .map(|(&p, &y)| {
                let cross = if y > 0.0 {
                    y * (log_t(y + LABEL_LOG_EPS, t1) - log_t(p, t1))
                } else {
                    0.0
                };
                cross - (y.powf(2.0 - t1) - p.powf(2.0 - t1)) / (2.0 - t1)
            })
            .sum()
    }

    /// dL/da_j = h_j - (w_j / sum w) * sum h, with h = p^(t2-t1) (p - y) and w = p^t2
    fn row_grad(&self, probs: &[f64], labels: &[f64]) -> Vec<f64> {
        let (t1, t2) = (self.t1, self.t2);
        let h: Vec<f64> = probs
            .iter()
            .zip(labels)
            .map(|(&p, &y)| if p > 0.0 { p.powf(t2 - t1) * (p - y) } else { 0.0 })
            .collect();
        let w: Vec<f64> = probs
            .iter()
            .map(|&p| if p > 0.0 { p.powf(t2) } else { 0.0 })
            .collect();
        let w_total: f64 = w.iter().sum();
        let h_total: f64 = h.iter().sum();
        if w_total <= 0.0 {
            return h;
        }
        h.iter()
            .zip(&w)
            .map(|(&hj, &wj)| hj - wj / w_total * h_total)
            .collect()
    }
}

impl Default for BiTemperedLoss {
    fn default() -> Self {
        Self {
            t1: 0.8,
            t2: 1.4,
            label_smoothing: 0.0,
            num_iters: 5,
        }
    }
}

impl LossFn for BiTemperedLoss {
    fn per_sample(&self, logits: &Array2<f32>, targets: &Array1<usize>) -> Result<Array1<f32>> {
        check_targets(logits, targets)?;
        let classes = logits.ncols();
        Ok(logits
            .axis_iter(Axis(0))
            .zip(targets)
            .map(|(row, &target)| {
                let probs = self.probabilities(row);
                self.row_loss(&probs, &self.soft_labels(target, classes)) as f32
            })
            .collect())
    }

    fn backward(
        &self,
        logits: &Array2<f32>,
        targets: &Array1<usize>,
        weights: &Array1<f32>,
    ) -> Result<Array2<f32>> {
        check_targets(logits, targets)?;
        check_weights(targets, weights)?;
        let classes = logits.ncols();
        let mut grad = Array2::zeros(logits.dim());
        for (i, (row, &target)) in logits.axis_iter(Axis(0)).zip(targets).enumerate() {
            let probs = self.probabilities(row);
            let row_grad = self.row_grad(&probs, &self.soft_labels(target, classes));
            let weight = f64::from(weights[i]);
            for (j, g) in row_grad.into_iter().enumerate() {
                grad[[i, j]] = (g * weight) as f32;
            }
        }
        Ok(grad)
    }

    fn name(&self) -> &'static str {
        "BiTemperedLogistic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::train::loss::CrossEntropyLoss;
    use approx::assert_abs_diff_eq;
    use ndarray::{arr1, arr2};

    #[test]
    fn test_log_exp_t_are_inverse() {
        for &t in &[0.5, 1.0, 1.5] {
            for &u in &[0.2, 0.7, 1.3] {
                assert_abs_diff_eq!(exp_t(log_t(u, t), t), u, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn test_tempered_softmax_sums_to_one() {
        let acts = [2.0, -1.0, 0.5, 0.0, 1.5];
        for &(t, iters) in &[(1.0, 5), (1.4, 50), (0.7, 5)] {
            let probs = tempered_softmax(&acts, t, iters);
            assert_abs_diff_eq!(probs.iter().sum::<f64>(), 1.0, epsilon = 1e-3);
            assert!(probs.iter().all(|&p| p >= 0.0));
        }
    }

    #[test]
    fn test_unit_temperatures_match_cross_entropy() {
        let logits = arr2(&[[1.0, 2.0, 0.5], [0.0, -1.0, 3.0]]);
        let targets = arr1(&[1, 2]);
        let tempered = BiTemperedLoss::new(1.0, 1.0).unwrap();

        let a = tempered.per_sample(&logits, &targets).unwrap();
        let b = CrossEntropyLoss.per_sample(&logits, &targets).unwrap();
        for (x, y) in a.iter().zip(b.iter()) {
            assert_abs_diff_eq!(*x, *y, epsilon = 1e-5);
        }

        let weights = arr1(&[0.5, 1.0]);
        let ga = tempered.backward(&logits, &targets, &weights).unwrap();
        let gb = CrossEntropyLoss.backward(&logits, &targets, &weights).unwrap();
        for (x, y) in ga.iter().zip(gb.iter()) {
            assert_abs_diff_eq!(*x, *y, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_gradient_matches_finite_difference() {
        let loss = BiTemperedLoss::new(0.8, 1.4).unwrap().with_num_iters(60);
        let logits = arr2(&[[0.6, -0.4, 1.1, 0.2, -0.9]]);
        let targets = arr1(&[3]);
        let grad = loss.backward(&logits, &targets, &arr1(&[1.0])).unwrap();

        let eps = 1e-2;
        for j in 0..logits.ncols() {
            let mut plus = logits.clone();
            plus[[0, j]] += eps;
            let mut minus = logits.clone();
            minus[[0, j]] -= eps;
            let numeric = (loss.per_sample(&plus, &targets).unwrap()[0]
                - loss.per_sample(&minus, &targets).unwrap()[0])
                / (2.0 * eps);
            assert_abs_diff_eq!(grad[[0, j]], numeric, epsilon = 2e-3);
        }
    }

    #[test]
    fn test_loss_is_bounded_for_confident_mistakes() {
        // t1 < 1 caps the loss of a hopeless sample; cross-entropy keeps growing
        let loss = BiTemperedLoss::new(0.5, 1.0).unwrap();
        let logits = arr2(&[[30.0, -30.0]]);
        let targets = arr1(&[1]);
        let tempered = loss.per_sample(&logits, &targets).unwrap()[0];
        let ce = CrossEntropyLoss.per_sample(&logits, &targets).unwrap()[0];
        assert!(tempered < 5.0);
        assert!(ce > 50.0);
    }

    #[test]
    fn test_label_smoothing_keeps_mass() {
        let loss = BiTemperedLoss::default().with_label_smoothing(0.1);
        let labels = loss.soft_labels(0, 5);
        assert_abs_diff_eq!(labels.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(labels[0], 0.9, epsilon = 1e-12);
    }

    #[test]
    fn test_invalid_temperatures() {
        assert!(BiTemperedLoss::new(2.0, 1.0).is_err());
        assert!(BiTemperedLoss::new(0.0, 1.0).is_err());
        assert!(BiTemperedLoss::new(0.8, 0.0).is_err());
    }

    #[test]
    fn test_default_temperatures() {
        let loss = BiTemperedLoss::default();
        assert_eq!(loss.t1(), 0.8);
        assert_eq!(loss.t2(), 1.4);
        assert_eq!(loss.name(), "BiTemperedLogistic");
    }
}
