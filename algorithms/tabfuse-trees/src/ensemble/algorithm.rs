//! The per-feature cross-validated training loop

use ndarray::{Array1, Array2, ArrayBase, ArrayView2, Axis, Data, Ix1, Ix2};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;
use rayon::ThreadPool;
use tracing::{debug, info, warn};

use tabfuse::{
    dataset::{AsTargets, DatasetBase},
    error::Error,
    folds::{FoldIndices, KFold},
    metrics::BinaryClassification,
    traits::PredictProba,
    Float, ParamGuard,
};

use super::accumulator::{
    squash, FeatureAccumulator, FeatureColumns, FoldPredictions, PredictionMatrix,
};
use super::hyperparams::PerFeatureEnsembleValidParams;
use crate::error::Result;
use crate::gbdt::GbdtValidParams;

/// Upper bound (exclusive) of the per-feature fold seeds
const FEATURE_SEED_RANGE: u64 = 100_000;

/// The four prediction matrices of the per-feature ensemble
#[derive(Debug, Clone, PartialEq)]
pub struct EnsemblePredictions<F> {
    /// Squashed held-out predictions of the training samples
    pub oof: PredictionMatrix<F>,
    /// Squashed in-fold predictions of the training samples, averaged over `k - 1` folds
    pub train: PredictionMatrix<F>,
    pub test: PredictionMatrix<F>,
    pub fake: PredictionMatrix<F>,
}

/// Diagnostics of one feature
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureReport {
    pub name: String,
    pub seed: u64,
    /// Index of the selected setting
    pub chosen_setting: usize,
    /// Log-loss of the raw held-out probabilities per setting
    pub setting_scores: Vec<f64>,
    /// Kept boosting rounds per fold of the selected setting
    pub best_iterations: Vec<usize>,
    pub oof_auc: f64,
    /// AUC of the mean over all features finished so far
    pub cumulative_oof_auc: f64,
    pub cumulative_train_auc: f64,
    pub cumulative_test_auc: Option<f64>,
}

/// Diagnostics of a whole per-feature ensemble run
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EnsembleReport {
    pub features: Vec<FeatureReport>,
}

impl EnsembleReport {
    /// Selected setting index per feature
    pub fn chosen_settings(&self) -> Vec<usize> {
        self.features.iter().map(|f| f.chosen_setting).collect()
    }
}

/// Held-out diagnostics of one fold, NaN where a metric is undefined
struct FoldScores {
    auc: f64,
    loss: f64,
}

fn fold_scores<F: Float>(proba: &Array1<F>, targets: &[bool]) -> FoldScores {
    let to_f64 = |x: F| x.to_f64().unwrap_or(f64::NAN);
    FoldScores {
        auc: proba.roc_auc(targets).map(to_f64).unwrap_or(f64::NAN),
        loss: proba.log_loss(targets).map(to_f64).unwrap_or(f64::NAN),
    }
}

fn auc_of<F: Float>(scores: &Array1<F>, targets: &[bool]) -> f64 {
    scores
        .roc_auc(targets)
        .ok()
        .and_then(|auc| auc.to_f64())
        .unwrap_or(f64::NAN)
}

/// One setting of one feature while its folds are trained
struct SettingRun<F> {
    params: GbdtValidParams,
    acc: FeatureAccumulator<F>,
    best_iterations: Vec<usize>,
}

/// The selected setting of a finished feature
struct FeatureOutcome<F> {
    columns: FeatureColumns<F>,
    report: FeatureReport,
}

impl PerFeatureEnsembleValidParams {
    /// Trains the per-feature ensemble and predicts all partitions
    ///
    /// Every column of `train` is treated as one feature and gets its own univariate booster per
    /// fold. `test` and `fake` need the same columns in the same order. If `test_targets` is
    /// given, test AUC and log-loss are reported as well.
    pub fn fit_predict<F, D, T>(
        &self,
        train: &DatasetBase<ArrayBase<D, Ix2>, ArrayBase<T, Ix1>>,
        test: ArrayView2<F>,
        fake: ArrayView2<F>,
        test_targets: Option<&[bool]>,
    ) -> Result<(EnsemblePredictions<F>, EnsembleReport)>
    where
        F: Float,
        D: Data<Elem = F>,
        T: Data<Elem = bool>,
    {
        let nfeatures = train.nfeatures();
        if test.ncols() != nfeatures {
            return Err(Error::shape_mismatch("test features", nfeatures, test.ncols()).into());
        }
        if fake.ncols() != nfeatures {
            return Err(Error::shape_mismatch("fake features", nfeatures, fake.ncols()).into());
        }
        if let Some(targets) = test_targets {
            tabfuse::error::ensure_len("test targets", test.nrows(), targets.len())?;
        }
        let targets = train.targets().as_targets().to_vec();
        let names = train.feature_names();

        let pool = self.base().check_ref()?.thread_pool()?;
        let mut master = Xoshiro256Plus::seed_from_u64(self.seed());

        let mut oof = PredictionMatrix::new(train.nsamples(), names.clone());
        let mut train_pred = PredictionMatrix::new(train.nsamples(), names.clone());
        let mut test_pred = PredictionMatrix::new(test.nrows(), names.clone());
        let mut fake_pred = PredictionMatrix::new(fake.nrows(), names.clone());
        let mut report = EnsembleReport::default();

        info!(
            nfeatures,
            n_train = train.nsamples(),
            n_test = test.nrows(),
            n_fake = fake.nrows(),
            n_folds = self.n_folds(),
            n_settings = self.settings().len(),
            "training per-feature boosted ensemble"
        );

        for (feature, name) in names.iter().enumerate() {
            let seed = master.gen_range(0..FEATURE_SEED_RANGE);
            let outcome = self.fit_feature(
                feature,
                name,
                seed,
                train,
                &targets,
                test,
                fake,
                test_targets,
                &pool,
            )?;

            let FeatureOutcome {
                columns,
                report: mut feature_report,
            } = outcome;
            oof.insert(feature, columns.oof.view())?;
            train_pred.insert(feature, columns.train.view())?;
            test_pred.insert(feature, columns.test.view())?;
            fake_pred.insert(feature, columns.fake.view())?;

            feature_report.cumulative_oof_auc = auc_of(&oof.mean_of_filled(), &targets);
            feature_report.cumulative_train_auc = auc_of(&train_pred.mean_of_filled(), &targets);
            feature_report.cumulative_test_auc =
                test_targets.map(|y| auc_of(&test_pred.mean_of_filled(), y));

            info!(
                feature = %name,
                chosen_setting = feature_report.chosen_setting,
                oof_auc = feature_report.oof_auc,
                cumulative_oof_auc = feature_report.cumulative_oof_auc,
                cumulative_train_auc = feature_report.cumulative_train_auc,
                cumulative_test_auc = ?feature_report.cumulative_test_auc,
                "feature finished"
            );
            report.features.push(feature_report);
        }

        Ok((
            EnsemblePredictions {
                oof,
                train: train_pred,
                test: test_pred,
                fake: fake_pred,
            },
            report,
        ))
    }

    #[allow(clippy::too_many_arguments)]
    fn fit_feature<F, D, T>(
        &self,
        feature: usize,
        name: &str,
        seed: u64,
        train: &DatasetBase<ArrayBase<D, Ix2>, ArrayBase<T, Ix1>>,
        targets: &[bool],
        test: ArrayView2<F>,
        fake: ArrayView2<F>,
        test_targets: Option<&[bool]>,
        pool: &ThreadPool,
    ) -> Result<FeatureOutcome<F>>
    where
        F: Float,
        D: Data<Elem = F>,
        T: Data<Elem = bool>,
    {
        let folds = feature_folds(self.n_folds(), seed, targets)?;

        let column = train.records().column(feature);
        let test_column = test.column(feature).insert_axis(Axis(1));
        let fake_column = fake.column(feature).insert_axis(Axis(1));
        let offset = F::cast(self.squash_offset());

        let base = self.table().resolve(name, *self.base())?;
        let mut runs = self
            .settings()
            .iter()
            .map(|setting| {
                Ok(SettingRun {
                    params: setting.apply(base).check()?,
                    acc: FeatureAccumulator::new(
                        train.nsamples(),
                        test.nrows(),
                        fake.nrows(),
                        self.n_folds(),
                    ),
                    best_iterations: Vec::with_capacity(self.n_folds()),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut clamped = 0;
        for (j, fold) in folds.iter().enumerate() {
            let fold_train = univariate(&column, targets, &fold.train);
            let fold_valid = univariate(&column, targets, &fold.valid);
            let (train_y, valid_y) = (subset(targets, &fold.train), subset(targets, &fold.valid));

            for (s, run) in runs.iter_mut().enumerate() {
                let model = run
                    .params
                    .fit_with_validation_in(&fold_train, &fold_valid, pool)?;
                run.best_iterations.push(model.best_iteration());

                let valid_raw = model.predict_proba(fold_valid.records());
                let train_raw = model.predict_proba(fold_train.records());
                let test_raw = model.predict_proba(&test_column);
                let fake_raw = model.predict_proba(&fake_column);

                let valid_scores = fold_scores(&valid_raw, &valid_y);
                let train_scores = fold_scores(&train_raw, &train_y);
                let test_scores = test_targets.map(|y| fold_scores(&test_raw, y));
                debug!(
                    feature = %name,
                    fold = j,
                    setting = s,
                    best_iteration = model.best_iteration(),
                    valid_auc = valid_scores.auc,
                    train_auc = train_scores.auc,
                    valid_loss_x1000 = valid_scores.loss * 1000.0,
                    train_loss_x1000 = train_scores.loss * 1000.0,
                    test_auc = ?test_scores.as_ref().map(|t| t.auc),
                    test_loss_x1000 = ?test_scores.as_ref().map(|t| t.loss * 1000.0),
                    "fold finished"
                );

                let mut squashed = |p: &Array1<F>| {
                    let (out, n) = squash(p.view(), offset);
                    clamped += n;
                    out
                };
                let pred = FoldPredictions {
                    valid: squashed(&valid_raw),
                    train: squashed(&train_raw),
                    test: squashed(&test_raw),
                    fake: squashed(&fake_raw),
                    valid_raw,
                };
                run.acc.add_fold(fold, pred)?;
            }
        }
        if clamped > 0 {
            warn!(feature = %name, clamped, "squash argument clamped at zero");
        }

        let mut finished = runs
            .into_iter()
            .map(|run| {
                let columns = run.acc.finish()?;
                // scored on the raw probabilities, the squashed values are not probabilities
                let score = columns
                    .raw_oof
                    .log_loss(targets)
                    .map(|loss| loss.to_f64().unwrap_or(f64::NAN))?;
                Ok((columns, score, run.best_iterations))
            })
            .collect::<Result<Vec<_>>>()?;
        let setting_scores = finished.iter().map(|(_, score, _)| *score).collect::<Vec<_>>();

        // lowest held-out log-loss, ties keep the earlier setting
        let chosen = setting_scores
            .iter()
            .enumerate()
            .fold(0, |best, (s, score)| {
                if *score < setting_scores[best] || setting_scores[best].is_nan() {
                    s
                } else {
                    best
                }
            });
        if self.settings().len() > 1 {
            debug!(feature = %name, ?setting_scores, chosen, "setting selected");
        }

        let (columns, _, best_iterations) = finished.swap_remove(chosen);
        let oof_auc = auc_of(&columns.oof, targets);

        Ok(FeatureOutcome {
            columns,
            report: FeatureReport {
                name: name.to_string(),
                seed,
                chosen_setting: chosen,
                setting_scores,
                best_iterations,
                oof_auc,
                cumulative_oof_auc: f64::NAN,
                cumulative_train_auc: f64::NAN,
                cumulative_test_auc: None,
            },
        })
    }
}

fn subset(values: &[bool], indices: &[usize]) -> Vec<bool> {
    indices.iter().map(|&i| values[i]).collect()
}

/// Single-column dataset of `column` restricted to `rows`
fn univariate<F: Float, D: Data<Elem = F>>(
    column: &ArrayBase<D, Ix1>,
    targets: &[bool],
    rows: &[usize],
) -> DatasetBase<Array2<F>, Array1<bool>> {
    let records = column.select(Axis(0), rows).insert_axis(Axis(1));
    DatasetBase::new(records, Array1::from(subset(targets, rows)))
}

/// Stratified folds of one feature, shuffled with the feature's own seed
fn feature_folds(n_folds: usize, seed: u64, targets: &[bool]) -> Result<Vec<FoldIndices>> {
    Ok(KFold::params()
        .n_splits(n_folds)
        .shuffle(Some(seed))
        .stratified(true)
        .check()?
        .split(targets)?)
}
