//! Common metrics for performance evaluation of binary classifiers
//!
//! Every stage of the pipeline scores its out-of-fold predictions with the area under the ROC
//! curve and the binary log-loss. This module implements both, plus plain accuracy at a
//! threshold.
use ndarray::prelude::*;
use ndarray::Data;

use crate::dataset::Float;
use crate::error::{ensure_len, Error, Result};

/// Probabilities are clipped into `[EPS, 1 - EPS]` before taking logarithms
const LOG_LOSS_EPS: f64 = 1e-15;

/// Integration using the trapezoidal rule.
fn trapezoidal<A: Float>(vals: &[(A, A)]) -> A {
    let mut prev_x = vals[0].0;
    let mut prev_y = vals[0].1;
    let mut integral = A::zero();

    for (x, y) in vals.iter().skip(1) {
        integral += (*x - prev_x) * (prev_y + *y) / A::cast(2.0);
        prev_x = *x;
        prev_y = *y;
    }
    integral
}

/// A receiver operating characteristic curve
///
/// The curve starts at `(0, 0)` and ends at `(1, 1)`. Tied scores produce a single point, so the
/// area under the curve counts a tied positive/negative pair as one half.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceiverOperatingCharacteristic<A> {
    curve: Vec<(A, A)>,
    thresholds: Vec<A>,
}

impl<A: Float> ReceiverOperatingCharacteristic<A> {
    /// Points of the curve as (false positive rate, true positive rate)
    pub fn get_curve(&self) -> Vec<(A, A)> {
        self.curve.clone()
    }

    /// Score threshold belonging to each point after the origin
    pub fn get_thresholds(&self) -> Vec<A> {
        self.thresholds.clone()
    }

    pub fn area_under_curve(&self) -> A {
        trapezoidal(&self.curve)
    }
}

/// Scores of a binary classifier compared against ground truth
pub trait BinaryClassification<A: Float> {
    /// The ROC curve of scores `self` against labels `y`
    ///
    /// Fails if the lengths differ or if `y` does not contain both classes.
    fn roc(&self, y: &[bool]) -> Result<ReceiverOperatingCharacteristic<A>>;

    /// Area under the ROC curve
    fn roc_auc(&self, y: &[bool]) -> Result<A> {
        self.roc(y).map(|roc| roc.area_under_curve())
    }

    /// Mean binary cross-entropy of probabilities `self` against labels `y`
    fn log_loss(&self, y: &[bool]) -> Result<A>;

    /// Fraction of samples where `score > threshold` agrees with the label
    fn accuracy(&self, y: &[bool], threshold: A) -> Result<A>;
}

impl<A: Float, D: Data<Elem = A>> BinaryClassification<A> for ArrayBase<D, Ix1> {
    fn roc(&self, y: &[bool]) -> Result<ReceiverOperatingCharacteristic<A>> {
        ensure_len("roc labels", self.len(), y.len())?;

        let positives = y.iter().filter(|x| **x).count();
        let negatives = y.len() - positives;
        if positives == 0 || negatives == 0 {
            return Err(Error::MalformedInput(
                "ROC curve needs both classes in the ground truth".into(),
            ));
        }
        if self.iter().any(|x| x.is_nan()) {
            return Err(Error::MalformedInput("NaN in classifier scores".into()));
        }

        let mut tuples = self
            .iter()
            .copied()
            .zip(y.iter().copied())
            .collect::<Vec<(A, bool)>>();

        // descending by score, NaN was ruled out above
        tuples.sort_unstable_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        let (mut tp, mut fp) = (0usize, 0usize);
        let (pos, neg) = (A::cast(positives), A::cast(negatives));
        let mut curve = vec![(A::zero(), A::zero())];
        let mut thresholds = Vec::new();

        for (i, (score, label)) in tuples.iter().enumerate() {
            if *label {
                tp += 1;
            } else {
                fp += 1;
            }

            // only emit a point once all samples sharing this score are consumed
            let last_of_tie = tuples.get(i + 1).map(|next| next.0 != *score).unwrap_or(true);
            if last_of_tie {
                curve.push((A::cast(fp) / neg, A::cast(tp) / pos));
                thresholds.push(*score);
            }
        }

        Ok(ReceiverOperatingCharacteristic { curve, thresholds })
    }

    fn log_loss(&self, y: &[bool]) -> Result<A> {
        ensure_len("log-loss labels", self.len(), y.len())?;
        if self.is_empty() {
            return Err(Error::NotEnoughSamples);
        }

        let eps = A::cast(LOG_LOSS_EPS);
        let total = self
            .iter()
            .zip(y.iter())
            .map(|(p, label)| {
                let p = p.max(eps).min(A::one() - eps);
                if *label {
                    -p.ln()
                } else {
                    -(A::one() - p).ln()
                }
            })
            .sum::<A>();

        Ok(total / A::cast(self.len()))
    }

    fn accuracy(&self, y: &[bool], threshold: A) -> Result<A> {
        ensure_len("accuracy labels", self.len(), y.len())?;
        if self.is_empty() {
            return Err(Error::NotEnoughSamples);
        }

        let correct = self
            .iter()
            .zip(y.iter())
            .filter(|(score, label)| (**score > threshold) == **label)
            .count();

        Ok(A::cast(correct) / A::cast(self.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_roc_curve() {
        let predicted = array![0.1f64, 0.3, 0.5, 0.7, 0.8, 0.9];
        let groundtruth = vec![false, true, false, true, true, true];

        let result = vec![
            (0.0, 0.0),
            (0.0, 0.25),
            (0.0, 0.5),
            (0.0, 0.75),
            (0.5, 0.75),
            (0.5, 1.0),
            (1.0, 1.0),
        ];

        let roc = predicted.roc(&groundtruth).unwrap();
        assert_eq!(roc.get_curve(), result);
        assert_eq!(roc.get_thresholds(), vec![0.9, 0.8, 0.7, 0.5, 0.3, 0.1]);
    }

    #[test]
    fn test_roc_auc() {
        let predicted = Array1::linspace(0.0f64, 1.0, 1000);

        let mut groundtruth = vec![false; 1000];
        for x in groundtruth.iter_mut().skip(500) {
            *x = true;
        }

        assert_abs_diff_eq!(predicted.roc_auc(&groundtruth).unwrap(), 1.0);

        let inverted = predicted.mapv(|x| 1.0 - x);
        assert_abs_diff_eq!(inverted.roc_auc(&groundtruth).unwrap(), 0.0);
    }

    #[test]
    fn ties_count_one_half() {
        let predicted = array![0.5f32, 0.5, 0.5, 0.5];
        let groundtruth = vec![true, false, true, false];
        assert_abs_diff_eq!(predicted.roc_auc(&groundtruth).unwrap(), 0.5);

        let predicted = array![0.2f64, 0.6, 0.6, 0.9];
        let groundtruth = vec![false, false, true, true];
        // pairs: (0.9 > 0.2, 0.9 > 0.6, 0.6 = 0.6, 0.6 > 0.2) -> 3.5 / 4
        assert_abs_diff_eq!(predicted.roc_auc(&groundtruth).unwrap(), 0.875);
    }

    #[test]
    fn roc_rejects_single_class() {
        let predicted = array![0.1f64, 0.2];
        assert!(predicted.roc(&[true, true]).is_err());
        assert!(predicted.roc(&[true]).is_err());
    }

    #[test]
    fn test_log_loss() {
        let predicted = array![0.5f64, 0.5];
        assert_abs_diff_eq!(
            predicted.log_loss(&[true, false]).unwrap(),
            std::f64::consts::LN_2,
            epsilon = 1e-12
        );

        // saturated predictions stay finite
        let predicted = array![0.0f64, 1.0];
        let loss = predicted.log_loss(&[true, false]).unwrap();
        assert!(loss.is_finite());
        assert_abs_diff_eq!(loss, -(1e-15f64).ln(), epsilon = 0.1);
    }

    #[test]
    fn test_accuracy() {
        let predicted = array![0.1f64, 0.6, 0.4, 0.9];
        let acc = predicted
            .accuracy(&[false, true, true, true], 0.5)
            .unwrap();
        assert_abs_diff_eq!(acc, 0.75);
    }
}
