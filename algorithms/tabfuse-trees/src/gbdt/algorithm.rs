//! Gradient boosting for binary classification

use ndarray::{Array1, ArrayBase, Axis, Data, Ix2};
use rayon::ThreadPool;
use tracing::{debug, warn};

use tabfuse::{
    dataset::{AsTargets, DatasetBase},
    error::{Error, Result},
    traits::{Fit, PredictProba},
    Float,
};

#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

use super::binning::{BinMapper, BinnedMatrix};
use super::hyperparams::GbdtValidParams;
use super::tree::{leaf_value, Tree, TreeLearner};

const PROBA_CLIP: f64 = 1e-15;

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn mean_log_loss(scores: &[f64], targets: &[f64]) -> f64 {
    let total = scores
        .iter()
        .zip(targets)
        .map(|(s, y)| {
            let p = sigmoid(*s).max(PROBA_CLIP).min(1.0 - PROBA_CLIP);
            -(y * p.ln() + (1.0 - y) * (1.0 - p).ln())
        })
        .sum::<f64>();
    total / scores.len() as f64
}

/// Losses after one boosting round
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvalRecord {
    /// Number of trees after this round
    pub iteration: usize,
    pub train_loss: f64,
    pub valid_loss: Option<f64>,
}

/// A fitted ensemble of boosted trees
///
/// The raw score of a sample is the sum of the leaf values it reaches in every tree, the
/// probability of the positive class is the logistic function of the raw score. When the
/// ensemble was fitted with a validation set, only the trees up to the round with the lowest
/// validation loss are kept.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Debug, Clone, PartialEq)]
pub struct GradientBoostedTrees<F> {
    trees: Vec<Tree<F>>,
    mappers: Vec<BinMapper<F>>,
    best_iteration: usize,
    history: Vec<EvalRecord>,
}

impl<F: Float> GradientBoostedTrees<F> {
    pub fn trees(&self) -> &[Tree<F>] {
        &self.trees
    }

    /// Number of rounds kept for prediction
    pub fn best_iteration(&self) -> usize {
        self.best_iteration
    }

    /// Losses of every round that was trained, including rounds discarded by early stopping
    pub fn history(&self) -> &[EvalRecord] {
        &self.history
    }

    pub fn nfeatures(&self) -> usize {
        self.mappers.len()
    }

    /// Sum of split gains per feature over all kept trees
    pub fn feature_importance(&self) -> Array1<F> {
        let mut importance = Array1::zeros(self.nfeatures());
        for tree in &self.trees {
            for (acc, gain) in importance.iter_mut().zip(tree.feature_gains(self.nfeatures())) {
                *acc += gain;
            }
        }
        importance
    }

    /// Raw scores (log-odds)
    pub fn predict_raw<D: Data<Elem = F>>(&self, x: &ArrayBase<D, Ix2>) -> Array1<F> {
        x.axis_iter(Axis(0))
            .map(|row| {
                self.trees
                    .iter()
                    .fold(F::zero(), |acc, tree| acc + tree.predict_row(&row))
            })
            .collect()
    }
}

impl<F: Float, D: Data<Elem = F>> PredictProba<&ArrayBase<D, Ix2>, Array1<F>>
    for GradientBoostedTrees<F>
{
    fn predict_proba(&self, x: &ArrayBase<D, Ix2>) -> Array1<F> {
        self.predict_raw(x)
            .mapv(|s| F::one() / (F::one() + (-s).exp()))
    }
}

impl GbdtValidParams {
    /// A worker pool with `num_threads` threads for histogram construction
    pub fn thread_pool(&self) -> Result<ThreadPool> {
        rayon::ThreadPoolBuilder::new()
            .num_threads(self.num_threads())
            .build()
            .map_err(|e| Error::Parameters(format!("cannot start worker pool: {}", e)))
    }

    /// Fits on `train` and early-stops on the log-loss of `valid`
    pub fn fit_with_validation<F, D, E, T>(
        &self,
        train: &DatasetBase<ArrayBase<D, Ix2>, T>,
        valid: &DatasetBase<ArrayBase<E, Ix2>, T>,
    ) -> Result<GradientBoostedTrees<F>>
    where
        F: Float,
        D: Data<Elem = F>,
        E: Data<Elem = F>,
        T: AsTargets,
    {
        let pool = self.thread_pool()?;
        self.fit_with_validation_in(train, valid, &pool)
    }

    /// Same as [`fit_with_validation`](Self::fit_with_validation) on an existing worker pool
    pub fn fit_with_validation_in<F, D, E, T>(
        &self,
        train: &DatasetBase<ArrayBase<D, Ix2>, T>,
        valid: &DatasetBase<ArrayBase<E, Ix2>, T>,
        pool: &ThreadPool,
    ) -> Result<GradientBoostedTrees<F>>
    where
        F: Float,
        D: Data<Elem = F>,
        E: Data<Elem = F>,
        T: AsTargets,
    {
        if valid.nfeatures() != train.nfeatures() {
            return Err(Error::shape_mismatch(
                "validation features",
                train.nfeatures(),
                valid.nfeatures(),
            ));
        }
        if valid.nsamples() == 0 {
            return Err(Error::NotEnoughSamples);
        }
        self.boost(train, Some(valid), pool)
    }

    fn boost<F, D, E, T>(
        &self,
        train: &DatasetBase<ArrayBase<D, Ix2>, T>,
        valid: Option<&DatasetBase<ArrayBase<E, Ix2>, T>>,
        pool: &ThreadPool,
    ) -> Result<GradientBoostedTrees<F>>
    where
        F: Float,
        D: Data<Elem = F>,
        E: Data<Elem = F>,
        T: AsTargets,
    {
        let records = train.records();
        let n = records.nrows();
        if n == 0 {
            return Err(Error::NotEnoughSamples);
        }
        let y = train.targets().as_targets();
        if y.len() != n {
            return Err(Error::shape_mismatch("booster targets", n, y.len()));
        }
        let y = y.iter().map(|t| if *t { 1.0 } else { 0.0 }).collect::<Vec<f64>>();

        let mappers = records
            .axis_iter(Axis(1))
            .map(|column| BinMapper::from_values(column, self.max_bin()))
            .collect::<Result<Vec<_>>>()?;
        let binned = BinnedMatrix::new(records, &mappers);
        let learner = TreeLearner::new(self, &binned, &mappers, pool);

        let valid_y = match valid {
            Some(valid) => {
                let targets = valid.targets().as_targets();
                if targets.len() != valid.nsamples() {
                    return Err(Error::shape_mismatch(
                        "validation targets",
                        valid.nsamples(),
                        targets.len(),
                    ));
                }
                targets.iter().map(|t| if *t { 1.0 } else { 0.0 }).collect()
            }
            None => Vec::new(),
        };

        let mut scores = vec![0.0f64; n];
        let mut valid_scores = vec![0.0f64; valid_y.len()];
        let mut grad = vec![0.0; n];
        let mut hess = vec![0.0; n];

        let mut trees: Vec<Tree<F>> = Vec::new();
        let mut history = Vec::new();
        let mut best = (0usize, f64::INFINITY);

        for round in 0..self.num_boost_round() {
            for i in 0..n {
                let p = sigmoid(scores[i]);
                grad[i] = p - y[i];
                hess[i] = p * (1.0 - p);
            }

            let (tree, leaves) = learner.grow((0..n).collect(), &grad, &hess);
            if tree.num_leaves() < 2 {
                debug!(round, "no split with positive gain left, stopping");
                break;
            }

            for (node, rows) in &leaves {
                let value = leaf_value(&tree, *node).to_f64().unwrap_or(0.0);
                for &row in rows {
                    scores[row] += value;
                }
            }
            let train_loss = mean_log_loss(&scores, &y);

            let valid_loss = match valid {
                Some(valid) => {
                    let rows = valid.records().axis_iter(Axis(0));
                    for (score, row) in valid_scores.iter_mut().zip(rows) {
                        *score += tree.predict_row(&row).to_f64().unwrap_or(0.0);
                    }
                    Some(mean_log_loss(&valid_scores, &valid_y))
                }
                None => None,
            };
            trees.push(tree);
            history.push(EvalRecord {
                iteration: round + 1,
                train_loss,
                valid_loss,
            });

            let monitored = valid_loss.unwrap_or(train_loss);
            if !monitored.is_finite() {
                warn!(round, "loss is not finite, keeping the best round so far");
                break;
            }
            if monitored < best.1 {
                best = (round + 1, monitored);
            }

            if let (Some(_), Some(patience)) = (valid, self.early_stopping_rounds()) {
                if round + 1 - best.0 >= patience {
                    debug!(
                        round = round + 1,
                        best_iteration = best.0,
                        best_loss = best.1,
                        "early stopping"
                    );
                    break;
                }
            }
        }

        let best_iteration = if valid.is_some() {
            best.0
        } else {
            // without a validation set only a diverging loss truncates the ensemble
            match history.last() {
                Some(last) if last.train_loss.is_finite() => trees.len(),
                _ => best.0,
            }
        };
        trees.truncate(best_iteration);

        Ok(GradientBoostedTrees {
            trees,
            mappers,
            best_iteration,
            history,
        })
    }
}

impl<F: Float, D: Data<Elem = F>, T: AsTargets> Fit<ArrayBase<D, Ix2>, T, Error>
    for GbdtValidParams
{
    type Object = GradientBoostedTrees<F>;

    /// Fits all `num_boost_round` rounds without early stopping
    fn fit(&self, dataset: &DatasetBase<ArrayBase<D, Ix2>, T>) -> Result<Self::Object> {
        let pool = self.thread_pool()?;
        self.boost::<F, D, D, T>(dataset, None, &pool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{Array, Array1, Array2};
    use ndarray_rand::{rand::SeedableRng, rand_distr::Uniform, RandomExt};
    use rand::{rngs::SmallRng, Rng};
    use tabfuse::{metrics::BinaryClassification, Dataset, ParamGuard};

    /// One informative feature: the positive rate rises from 10% to 90% along x
    fn noisy_threshold(n: usize, seed: u64) -> Dataset<f64> {
        let mut rng = SmallRng::seed_from_u64(seed);
        let records = Array::random_using((n, 1), Uniform::new(-1.0f64, 1.0), &mut rng);
        let targets = records
            .column(0)
            .iter()
            .map(|x| rng.gen::<f64>() < 0.5 + 0.4 * x)
            .collect::<Array1<bool>>();
        Dataset::new(records, targets)
    }

    #[test]
    fn separable_feature_has_high_auc() {
        let records = Array2::from_shape_fn((400, 1), |(i, _)| i as f64 / 400.0);
        let targets = Array1::from_shape_fn(400, |i| (i / 50) % 2 == 1);
        let dataset = Dataset::new(records, targets.clone());

        let model = GradientBoostedTrees::<f64>::params()
            .num_leaves(16)
            .num_boost_round(100)
            .num_threads(2)
            .fit(&dataset)
            .unwrap();
        let proba = model.predict_proba(dataset.records());
        let auc = proba.roc_auc(targets.as_slice().unwrap()).unwrap();
        assert!(auc > 0.9, "AUC was {}", auc);
    }

    #[test]
    fn training_loss_decreases() {
        let dataset = noisy_threshold(500, 1);
        let model = GradientBoostedTrees::<f64>::params()
            .num_boost_round(30)
            .num_threads(1)
            .fit(&dataset)
            .unwrap();
        let history = model.history();
        assert_eq!(history.len(), 30);
        assert!(history[29].train_loss < history[0].train_loss);
        assert!(history[0].train_loss < std::f64::consts::LN_2);
        assert_eq!(model.best_iteration(), 30);
    }

    #[test]
    fn early_stopping_keeps_best_round() {
        let train = noisy_threshold(600, 2);
        let valid = noisy_threshold(300, 3);
        let params = GradientBoostedTrees::<f64>::params()
            .learning_rate(0.3)
            .num_leaves(5)
            .num_boost_round(500)
            .early_stopping_rounds(Some(10))
            .num_threads(1)
            .check()
            .unwrap();

        let model = params.fit_with_validation(&train, &valid).unwrap();
        let history = model.history();
        assert!(history.len() < 500);
        assert_eq!(model.trees().len(), model.best_iteration());
        assert_eq!(history.len(), model.best_iteration() + 10);

        let best_loss = history[model.best_iteration() - 1].valid_loss.unwrap();
        for record in history {
            assert!(record.valid_loss.unwrap() >= best_loss);
        }

        // predictions use exactly the kept trees
        let proba = model.predict_proba(valid.records());
        let loss = proba
            .log_loss(valid.targets().as_slice().unwrap())
            .unwrap();
        assert_abs_diff_eq!(loss, best_loss, epsilon = 1e-9);
    }

    #[test]
    fn constant_feature_predicts_even_odds() {
        let records = Array2::from_elem((100, 1), 3.0);
        let targets = Array1::from_shape_fn(100, |i| i % 4 == 0);
        let model = GradientBoostedTrees::<f64>::params()
            .num_threads(1)
            .fit(&Dataset::new(records.clone(), targets))
            .unwrap();
        assert!(model.trees().is_empty());
        assert_abs_diff_eq!(model.predict_proba(&records)[0], 0.5);
    }

    #[test]
    fn rejects_mismatched_validation() {
        let train = noisy_threshold(100, 4);
        let valid = Dataset::new(Array2::zeros((10, 2)), Array1::from_elem(10, true));
        let params = GradientBoostedTrees::<f64>::params().num_threads(1).check().unwrap();
        assert!(params.fit_with_validation(&train, &valid).is_err());
    }
}
