use tabfuse::{
    error::{Error, Result},
    ParamGuard,
};

#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

use crate::GradientBoostedTrees;

/// The set of hyperparameters that can be specified for fitting
/// [gradient boosted trees](struct.GradientBoostedTrees.html).
///
/// The objective is always the binary log-loss and boosting starts from a raw score of zero.
///
/// ### Example
///
/// ```rust
/// use tabfuse::prelude::*;
/// use tabfuse_trees::GradientBoostedTrees;
/// use ndarray::{Array1, Array2};
///
/// let records = Array2::from_shape_fn((200, 1), |(i, _)| i as f64);
/// let targets = Array1::from_shape_fn(200, |i| i >= 100);
/// let dataset = Dataset::new(records, targets);
///
/// let model = GradientBoostedTrees::<f64>::params()
///     .num_leaves(4)
///     .num_boost_round(20)
///     .num_threads(1)
///     .fit(&dataset)
///     .unwrap();
/// let proba = model.predict_proba(dataset.records());
/// assert!(proba[0] < 0.5 && proba[199] > 0.5);
/// ```
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GbdtValidParams {
    learning_rate: f64,
    num_leaves: usize,
    max_depth: Option<usize>,
    max_bin: usize,
    reg_alpha: f64,
    reg_lambda: f64,
    min_data_in_leaf: usize,
    min_sum_hessian_in_leaf: f64,
    num_boost_round: usize,
    early_stopping_rounds: Option<usize>,
    num_threads: usize,
}

impl GbdtValidParams {
    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    pub fn num_leaves(&self) -> usize {
        self.num_leaves
    }

    pub fn max_depth(&self) -> Option<usize> {
        self.max_depth
    }

    pub fn max_bin(&self) -> usize {
        self.max_bin
    }

    pub fn reg_alpha(&self) -> f64 {
        self.reg_alpha
    }

    pub fn reg_lambda(&self) -> f64 {
        self.reg_lambda
    }

    pub fn min_data_in_leaf(&self) -> usize {
        self.min_data_in_leaf
    }

    pub fn min_sum_hessian_in_leaf(&self) -> f64 {
        self.min_sum_hessian_in_leaf
    }

    pub fn num_boost_round(&self) -> usize {
        self.num_boost_round
    }

    pub fn early_stopping_rounds(&self) -> Option<usize> {
        self.early_stopping_rounds
    }

    pub fn num_threads(&self) -> usize {
        self.num_threads
    }
}

#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GbdtParams(GbdtValidParams);

impl GbdtParams {
    pub fn new() -> Self {
        Self(GbdtValidParams {
            learning_rate: 0.08,
            num_leaves: 4,
            max_depth: None,
            max_bin: 256,
            reg_alpha: 2.0,
            reg_lambda: 0.0,
            min_data_in_leaf: 20,
            min_sum_hessian_in_leaf: 1e-3,
            num_boost_round: 2000,
            early_stopping_rounds: Some(10),
            num_threads: 8,
        })
    }

    /// Sets the shrinkage applied to every leaf value
    pub fn learning_rate(mut self, learning_rate: f64) -> Self {
        self.0.learning_rate = learning_rate;
        self
    }

    /// Sets the maximal number of leaves per tree
    pub fn num_leaves(mut self, num_leaves: usize) -> Self {
        self.0.num_leaves = num_leaves;
        self
    }

    /// Sets the optional limit to the depth of every tree
    pub fn max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.0.max_depth = max_depth;
        self
    }

    /// Sets the maximal number of histogram bins per feature
    pub fn max_bin(mut self, max_bin: usize) -> Self {
        self.0.max_bin = max_bin;
        self
    }

    /// Sets the L1 penalty on leaf values
    pub fn reg_alpha(mut self, reg_alpha: f64) -> Self {
        self.0.reg_alpha = reg_alpha;
        self
    }

    /// Sets the L2 penalty on leaf values
    pub fn reg_lambda(mut self, reg_lambda: f64) -> Self {
        self.0.reg_lambda = reg_lambda;
        self
    }

    /// Sets the minimal number of samples a split has to leave in each child
    pub fn min_data_in_leaf(mut self, min_data_in_leaf: usize) -> Self {
        self.0.min_data_in_leaf = min_data_in_leaf;
        self
    }

    /// Sets the minimal hessian sum a split has to leave in each child
    pub fn min_sum_hessian_in_leaf(mut self, min_sum_hessian_in_leaf: f64) -> Self {
        self.0.min_sum_hessian_in_leaf = min_sum_hessian_in_leaf;
        self
    }

    /// Sets the maximal number of boosting rounds
    pub fn num_boost_round(mut self, num_boost_round: usize) -> Self {
        self.0.num_boost_round = num_boost_round;
        self
    }

    /// Stop once the validation loss has not improved for this many rounds
    ///
    /// Only used by [`fit_with_validation`](GbdtValidParams::fit_with_validation).
    pub fn early_stopping_rounds(mut self, early_stopping_rounds: Option<usize>) -> Self {
        self.0.early_stopping_rounds = early_stopping_rounds;
        self
    }

    /// Sets the number of worker threads used to build histograms
    pub fn num_threads(mut self, num_threads: usize) -> Self {
        self.0.num_threads = num_threads;
        self
    }
}

impl Default for GbdtParams {
    fn default() -> Self {
        Self::new()
    }
}

impl<F> GradientBoostedTrees<F> {
    /// Defaults are provided if the optional parameters are not specified:
    /// * `learning_rate = 0.08`
    /// * `num_leaves = 4`
    /// * `max_depth = None`
    /// * `max_bin = 256`
    /// * `reg_alpha = 2.0`
    /// * `reg_lambda = 0.0`
    /// * `min_data_in_leaf = 20`
    /// * `min_sum_hessian_in_leaf = 1e-3`
    /// * `num_boost_round = 2000`
    /// * `early_stopping_rounds = Some(10)`
    /// * `num_threads = 8`
    pub fn params() -> GbdtParams {
        GbdtParams::new()
    }
}

impl ParamGuard for GbdtParams {
    type Checked = GbdtValidParams;
    type Error = Error;

    fn check_ref(&self) -> Result<&Self::Checked> {
        let p = &self.0;
        if !(p.learning_rate > 0.0) || !p.learning_rate.is_finite() {
            Err(Error::Parameters(format!(
                "Learning rate should be positive, but was {}",
                p.learning_rate
            )))
        } else if p.num_leaves < 2 {
            Err(Error::Parameters(format!(
                "Number of leaves should be at least two, but was {}",
                p.num_leaves
            )))
        } else if p.max_bin < 2 || p.max_bin > u16::MAX as usize {
            Err(Error::Parameters(format!(
                "Maximal number of bins should be in [2, {}], but was {}",
                u16::MAX,
                p.max_bin
            )))
        } else if p.reg_alpha < 0.0 || p.reg_lambda < 0.0 {
            Err(Error::Parameters(format!(
                "Regularization should be non-negative, but was alpha = {}, lambda = {}",
                p.reg_alpha, p.reg_lambda
            )))
        } else if p.min_sum_hessian_in_leaf < 0.0 {
            Err(Error::Parameters(format!(
                "Minimal hessian sum should be non-negative, but was {}",
                p.min_sum_hessian_in_leaf
            )))
        } else if p.num_boost_round == 0 {
            Err(Error::Parameters(
                "Number of boosting rounds should be positive".into(),
            ))
        } else if p.early_stopping_rounds == Some(0) {
            Err(Error::Parameters(
                "Early stopping patience should be positive".into(),
            ))
        } else if p.num_threads == 0 {
            Err(Error::Parameters(
                "Number of threads should be positive".into(),
            ))
        } else {
            Ok(&self.0)
        }
    }

    fn check(self) -> Result<Self::Checked> {
        self.check_ref()?;
        Ok(self.0)
    }
}
