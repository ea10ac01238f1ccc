//! K-fold training of the fusion network

use ndarray::{Array1, ArrayView2, Axis};
use rand::{seq::SliceRandom, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;
use tracing::{debug, info, warn};

use tabfuse::{
    error::{ensure_len, Error},
    folds::KFold,
    metrics::BinaryClassification,
    ParamGuard,
};

#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

use crate::error::Result;
use crate::network::{accuracy, binary_cross_entropy, FusionNetwork, PoolLayout};
use crate::optimizer::Adam;
use crate::schema::SLOTS;

#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionTrainerValidParams {
    n_folds: usize,
    epochs: usize,
    batch_size: usize,
    learning_rate: f32,
    late_learning_rate: f32,
    late_phase_start: f32,
    decay: f32,
    seed: u64,
    stratified: bool,
    layout: PoolLayout,
    restore_best_weights: bool,
    predict_batch_size: usize,
}

impl FusionTrainerValidParams {
    pub fn n_folds(&self) -> usize {
        self.n_folds
    }

    pub fn epochs(&self) -> usize {
        self.epochs
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn layout(&self) -> PoolLayout {
        self.layout
    }

    /// Learning rate of the (zero-based) epoch `epoch`
    pub fn learning_rate_at(&self, epoch: usize) -> f32 {
        if epoch as f32 <= self.late_phase_start * self.epochs as f32 {
            self.learning_rate
        } else {
            self.late_learning_rate
        }
    }
}

/// Training parameters of the fusion network
///
/// ```rust
/// use tabfuse::ParamGuard;
/// use tabfuse_fusion::FusionTrainer;
///
/// let params = FusionTrainer::params().epochs(10).check().unwrap();
/// assert_eq!(params.learning_rate_at(8), 0.02);
/// assert_eq!(params.learning_rate_at(9), 0.002);
/// ```
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionTrainerParams(FusionTrainerValidParams);

/// Marker type to create fusion training parameters
pub struct FusionTrainer;

impl FusionTrainer {
    /// Defaults:
    /// * `n_folds = 7`, contiguous unshuffled folds
    /// * `epochs = 60`
    /// * `batch_size = 4000`
    /// * `learning_rate = 0.02` up to epoch `0.8 * epochs`, `0.002` afterwards
    /// * `decay = 1e-5` per update
    /// * `seed = 42`
    /// * `layout = PoolLayout::AcrossFeatures`
    /// * `restore_best_weights = false`
    pub fn params() -> FusionTrainerParams {
        FusionTrainerParams(FusionTrainerValidParams {
            n_folds: 7,
            epochs: 60,
            batch_size: 4000,
            learning_rate: 0.02,
            late_learning_rate: 0.002,
            late_phase_start: 0.8,
            decay: 1e-5,
            seed: 42,
            stratified: false,
            layout: PoolLayout::AcrossFeatures,
            restore_best_weights: false,
            predict_batch_size: 2000,
        })
    }
}

impl FusionTrainerParams {
    pub fn n_folds(mut self, n_folds: usize) -> Self {
        self.0.n_folds = n_folds;
        self
    }

    pub fn epochs(mut self, epochs: usize) -> Self {
        self.0.epochs = epochs;
        self
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.0.batch_size = batch_size;
        self
    }

    /// Sets the learning rates before and after `late_phase_start * epochs`
    pub fn learning_rates(mut self, early: f32, late: f32) -> Self {
        self.0.learning_rate = early;
        self.0.late_learning_rate = late;
        self
    }

    pub fn late_phase_start(mut self, fraction: f32) -> Self {
        self.0.late_phase_start = fraction;
        self
    }

    /// Sets the time-based decay applied on every update
    pub fn decay(mut self, decay: f32) -> Self {
        self.0.decay = decay;
        self
    }

    /// Seeds weight initialization and batch shuffling, fold `j` uses `seed + j`
    pub fn seed(mut self, seed: u64) -> Self {
        self.0.seed = seed;
        self
    }

    /// Keep the class balance in every fold
    pub fn stratified(mut self, stratified: bool) -> Self {
        self.0.stratified = stratified;
        self
    }

    /// Pooling across features needs an even number of features
    pub fn layout(mut self, layout: PoolLayout) -> Self {
        self.0.layout = layout;
        self
    }

    /// Always finish a fold with the weights of its lowest validation loss
    pub fn restore_best_weights(mut self, restore: bool) -> Self {
        self.0.restore_best_weights = restore;
        self
    }

    pub fn predict_batch_size(mut self, predict_batch_size: usize) -> Self {
        self.0.predict_batch_size = predict_batch_size;
        self
    }
}

impl ParamGuard for FusionTrainerParams {
    type Checked = FusionTrainerValidParams;
    type Error = Error;

    fn check_ref(&self) -> std::result::Result<&Self::Checked, Error> {
        let p = &self.0;
        if p.n_folds < 2 {
            Err(Error::Parameters(format!(
                "Number of folds should be at least two, but was {}",
                p.n_folds
            )))
        } else if p.epochs == 0 || p.batch_size == 0 || p.predict_batch_size == 0 {
            Err(Error::Parameters(
                "Epochs and batch sizes should be positive".into(),
            ))
        } else if !(p.learning_rate > 0.0) || !(p.late_learning_rate > 0.0) {
            Err(Error::Parameters(format!(
                "Learning rates should be positive, but were {} and {}",
                p.learning_rate, p.late_learning_rate
            )))
        } else if !(0.0..=1.0).contains(&p.late_phase_start) {
            Err(Error::Parameters(format!(
                "Late phase start should be a fraction of the epochs, but was {}",
                p.late_phase_start
            )))
        } else if !(p.decay >= 0.0) {
            Err(Error::Parameters(format!(
                "Decay should be non-negative, but was {}",
                p.decay
            )))
        } else {
            Ok(&self.0)
        }
    }

    fn check(self) -> std::result::Result<Self::Checked, Error> {
        self.check_ref()?;
        Ok(self.0)
    }
}

/// Losses and accuracies after one epoch
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochRecord {
    pub epoch: usize,
    pub learning_rate: f32,
    /// Mean loss over the batches of the epoch
    pub train_loss: f32,
    pub train_accuracy: f32,
    pub valid_loss: f32,
    pub valid_accuracy: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FoldReport {
    pub history: Vec<EpochRecord>,
    /// Epoch whose weights produced the predictions
    pub used_epoch: usize,
    pub diverged: bool,
    pub valid_auc: f32,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct FusionReport {
    pub folds: Vec<FoldReport>,
    pub oof_auc: f32,
    pub holdout_auc: f32,
    pub test_auc: Option<f32>,
}

/// Fused probabilities of all partitions
#[derive(Debug, Clone, PartialEq)]
pub struct FusionPredictions {
    /// Per training sample, the mean over the `k - 1` fold models that trained on it
    pub oof: Array1<f32>,
    /// Per training sample, the prediction of the fold model that held it out
    pub holdout: Array1<f32>,
    /// Mean over all fold models
    pub test: Array1<f32>,
    /// Mean over all fold models
    pub fake: Array1<f32>,
}

fn auc(scores: &Array1<f32>, targets: &[bool]) -> f32 {
    scores.roc_auc(targets).unwrap_or(f32::NAN)
}

impl FusionTrainerValidParams {
    /// Trains one network per fold on assembled inputs and predicts all partitions
    ///
    /// `train`, `test` and `fake` are assembled by a [`FusionSchema`](crate::FusionSchema) and
    /// must have the same width.
    pub fn fit_predict(
        &self,
        train: ArrayView2<f32>,
        targets: &[bool],
        test: ArrayView2<f32>,
        fake: ArrayView2<f32>,
        test_targets: Option<&[bool]>,
    ) -> Result<(FusionPredictions, FusionReport)> {
        ensure_len("fusion targets", train.nrows(), targets.len())?;
        if train.ncols() == 0 || train.ncols() % SLOTS != 0 {
            return Err(Error::MalformedInput(format!(
                "fusion input width {} is not a positive multiple of {}",
                train.ncols(),
                SLOTS
            ))
            .into());
        }
        ensure_len("test input width", train.ncols(), test.ncols())?;
        ensure_len("fake input width", train.ncols(), fake.ncols())?;
        if let Some(y) = test_targets {
            ensure_len("test targets", test.nrows(), y.len())?;
        }
        let nfeatures = train.ncols() / SLOTS;

        let folds = KFold::params()
            .n_splits(self.n_folds)
            .stratified(self.stratified)
            .check()?
            .split(targets)?;

        let n = train.nrows();
        let mut oof = Array1::<f32>::zeros(n);
        let mut holdout = Array1::<f32>::zeros(n);
        let mut test_pred = Array1::<f32>::zeros(test.nrows());
        let mut fake_pred = Array1::<f32>::zeros(fake.nrows());
        let mut report = FusionReport::default();

        info!(
            nfeatures,
            n_train = n,
            n_folds = self.n_folds,
            epochs = self.epochs,
            "training fusion network"
        );

        for (j, fold) in folds.iter().enumerate() {
            let mut rng = Xoshiro256Plus::seed_from_u64(self.seed.wrapping_add(j as u64));
            let network = FusionNetwork::new(nfeatures, self.layout, &mut rng)?;
            if j == 0 {
                info!(parameters = network.parameter_count()?, "fusion network initialized");
            }

            let x_train = train.select(Axis(0), &fold.train);
            let y_train = fold.train.iter().map(|&i| targets[i]).collect::<Vec<_>>();
            let x_valid = train.select(Axis(0), &fold.valid);
            let y_valid = fold.valid.iter().map(|&i| targets[i]).collect::<Vec<_>>();

            let mut fold_report = self.train_fold(
                &network,
                &x_train.view(),
                &y_train,
                &x_valid.view(),
                &y_valid,
                &mut rng,
            )?;

            let all = network.predict(train, self.predict_batch_size)?;
            for &i in &fold.train {
                oof[i] += all[i];
            }
            for &i in &fold.valid {
                holdout[i] = all[i];
            }
            test_pred.scaled_add(1.0, &network.predict(test, self.predict_batch_size)?);
            fake_pred.scaled_add(1.0, &network.predict(fake, self.predict_batch_size)?);

            let valid_proba = fold.valid.iter().map(|&i| all[i]).collect::<Array1<f32>>();
            fold_report.valid_auc = auc(&valid_proba, &y_valid);
            info!(
                fold = j,
                used_epoch = fold_report.used_epoch,
                diverged = fold_report.diverged,
                valid_auc = fold_report.valid_auc,
                "fusion fold finished"
            );
            report.folds.push(fold_report);
        }

        oof /= (self.n_folds - 1) as f32;
        test_pred /= self.n_folds as f32;
        fake_pred /= self.n_folds as f32;

        report.oof_auc = auc(&oof, targets);
        report.holdout_auc = auc(&holdout, targets);
        report.test_auc = test_targets.map(|y| auc(&test_pred, y));
        info!(
            oof_auc = report.oof_auc,
            holdout_auc = report.holdout_auc,
            test_auc = ?report.test_auc,
            "fusion network finished"
        );

        Ok((
            FusionPredictions {
                oof,
                holdout,
                test: test_pred,
                fake: fake_pred,
            },
            report,
        ))
    }

    /// Runs all epochs of one fold and leaves `network` with the weights to predict with
    fn train_fold(
        &self,
        network: &FusionNetwork,
        x_train: &ArrayView2<f32>,
        y_train: &[bool],
        x_valid: &ArrayView2<f32>,
        y_valid: &[bool],
        rng: &mut Xoshiro256Plus,
    ) -> Result<FoldReport> {
        let mut adam = Adam::new(network.trainable_vars(), self.learning_rate, self.decay)?;
        let mut order = (0..x_train.nrows()).collect::<Vec<_>>();
        let mut history = Vec::with_capacity(self.epochs);

        // the untrained network is the fallback if the very first epoch diverges
        let mut best = (f32::INFINITY, 0, network.checkpoint()?);
        let mut diverged = false;

        for epoch in 0..self.epochs {
            let learning_rate = self.learning_rate_at(epoch);
            adam.set_learning_rate(learning_rate);
            order.shuffle(rng);

            let (mut loss_sum, mut hits, mut seen) = (0.0f32, 0.0f32, 0usize);
            for batch in order.chunks(self.batch_size) {
                // batch statistics need at least two rows
                if batch.len() < 2 {
                    continue;
                }
                let x = x_train.select(Axis(0), batch);
                let y = batch.iter().map(|&i| y_train[i]).collect::<Vec<_>>();
                let (loss, acc) = network.train_batch(x.view(), &y, &mut adam)?;
                loss_sum += loss * batch.len() as f32;
                hits += acc * batch.len() as f32;
                seen += batch.len();
            }

            let train_loss = loss_sum / seen.max(1) as f32;
            let valid_proba = network.predict(x_valid.view(), self.predict_batch_size)?;
            let record = EpochRecord {
                epoch,
                learning_rate,
                train_loss,
                train_accuracy: hits / seen.max(1) as f32,
                valid_loss: binary_cross_entropy(&valid_proba, y_valid),
                valid_accuracy: accuracy(&valid_proba, y_valid),
            };
            debug!(
                epoch,
                learning_rate,
                train_loss = record.train_loss,
                train_accuracy = record.train_accuracy,
                valid_loss = record.valid_loss,
                valid_accuracy = record.valid_accuracy,
                "fusion epoch"
            );
            history.push(record);

            if !record.train_loss.is_finite() || !record.valid_loss.is_finite() {
                warn!(epoch, "fusion loss is not finite, restoring the best epoch");
                diverged = true;
                break;
            }
            if record.valid_loss < best.0 {
                best = (record.valid_loss, epoch, network.checkpoint()?);
            }
        }

        let last_epoch = history.len().saturating_sub(1);
        let used_epoch = if diverged || self.restore_best_weights {
            let (_, epoch, weights) = best;
            network.restore(&weights)?;
            epoch
        } else {
            last_epoch
        };

        Ok(FoldReport {
            history,
            used_epoch,
            diverged,
            valid_auc: f32::NAN,
        })
    }
}
