//! Out-of-fold bookkeeping
//!
//! A [`FeatureAccumulator`] collects the fold predictions of one feature and is turned into
//! [`FeatureColumns`] once every fold was added. The columns of all features are merged into
//! [`PredictionMatrix`] values at the end, nothing is shared between features while they train.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use tabfuse::{
    error::{ensure_len, Error, Result},
    folds::FoldIndices,
    Float,
};

/// Concave squashing `sqrt(p - mean(p) + offset)` of one prediction batch
///
/// Arguments below zero are clamped, the number of clamped entries is returned alongside.
pub fn squash<F: Float>(p: ArrayView1<F>, offset: F) -> (Array1<F>, usize) {
    let mean = p.mean().unwrap_or_else(F::zero);
    let mut clamped = 0;
    let squashed = p.mapv(|x| {
        let arg = x - mean + offset;
        if arg < F::zero() {
            clamped += 1;
            F::zero()
        } else {
            arg.sqrt()
        }
    });
    (squashed, clamped)
}

/// Predictions of one fold model
#[derive(Debug, Clone)]
pub struct FoldPredictions<F> {
    /// Un-squashed probabilities of the held-out samples
    pub valid_raw: Array1<F>,
    pub valid: Array1<F>,
    pub train: Array1<F>,
    pub test: Array1<F>,
    pub fake: Array1<F>,
}

/// Final prediction columns of one feature
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureColumns<F> {
    pub oof: Array1<F>,
    pub raw_oof: Array1<F>,
    pub train: Array1<F>,
    pub test: Array1<F>,
    pub fake: Array1<F>,
}

/// Accumulates the fold predictions of a single feature
///
/// Held-out predictions are written at their fold indices, test and fake predictions are
/// averaged over all `k` folds and training predictions over the `k - 1` folds each training
/// sample takes part in.
#[derive(Debug, Clone)]
pub struct FeatureAccumulator<F> {
    n_folds: usize,
    folds_added: usize,
    oof: Array1<F>,
    raw_oof: Array1<F>,
    train: Array1<F>,
    test: Array1<F>,
    fake: Array1<F>,
    valid_hits: Vec<usize>,
    train_hits: Vec<usize>,
}

impl<F: Float> FeatureAccumulator<F> {
    pub fn new(n_train: usize, n_test: usize, n_fake: usize, n_folds: usize) -> Self {
        FeatureAccumulator {
            n_folds,
            folds_added: 0,
            oof: Array1::zeros(n_train),
            raw_oof: Array1::zeros(n_train),
            train: Array1::zeros(n_train),
            test: Array1::zeros(n_test),
            fake: Array1::zeros(n_fake),
            valid_hits: vec![0; n_train],
            train_hits: vec![0; n_train],
        }
    }

    pub fn add_fold(&mut self, fold: &FoldIndices, pred: FoldPredictions<F>) -> Result<()> {
        ensure_len("held-out predictions", fold.valid.len(), pred.valid.len())?;
        ensure_len("raw held-out predictions", fold.valid.len(), pred.valid_raw.len())?;
        ensure_len("training predictions", fold.train.len(), pred.train.len())?;
        ensure_len("test predictions", self.test.len(), pred.test.len())?;
        ensure_len("fake predictions", self.fake.len(), pred.fake.len())?;
        if self.folds_added == self.n_folds {
            return Err(Error::shape_mismatch(
                "accumulated folds",
                self.n_folds,
                self.folds_added + 1,
            ));
        }

        let n = self.oof.len();
        fold.check_disjoint(n)?;
        for ((&idx, p), raw) in fold.valid.iter().zip(&pred.valid).zip(&pred.valid_raw) {
            if idx >= n {
                return Err(Error::shape_mismatch("held-out index", n, idx + 1));
            }
            self.oof[idx] = *p;
            self.raw_oof[idx] = *raw;
            self.valid_hits[idx] += 1;
        }

        let train_weight = F::one() / F::cast(self.n_folds - 1);
        for (&idx, p) in fold.train.iter().zip(&pred.train) {
            if idx >= n {
                return Err(Error::shape_mismatch("training index", n, idx + 1));
            }
            self.train[idx] += *p * train_weight;
            self.train_hits[idx] += 1;
        }

        let weight = F::one() / F::cast(self.n_folds);
        self.test.scaled_add(weight, &pred.test);
        self.fake.scaled_add(weight, &pred.fake);
        self.folds_added += 1;

        Ok(())
    }

    /// Checks coverage and returns the averaged columns
    ///
    /// Fails unless all folds were added, every sample was held out exactly once and trained on
    /// in exactly `k - 1` folds.
    pub fn finish(self) -> Result<FeatureColumns<F>> {
        ensure_len("accumulated folds", self.n_folds, self.folds_added)?;
        if let Some(idx) = self.valid_hits.iter().position(|&hits| hits != 1) {
            return Err(Error::shape_mismatch(
                format!("held-out predictions of sample {}", idx),
                1,
                self.valid_hits[idx],
            ));
        }
        if let Some(idx) = self.train_hits.iter().position(|&hits| hits != self.n_folds - 1) {
            return Err(Error::shape_mismatch(
                format!("training predictions of sample {}", idx),
                self.n_folds - 1,
                self.train_hits[idx],
            ));
        }

        Ok(FeatureColumns {
            oof: self.oof,
            raw_oof: self.raw_oof,
            train: self.train,
            test: self.test,
            fake: self.fake,
        })
    }
}

/// A (samples × features) matrix with one prediction column per feature
///
/// Columns are written once each and validated on insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionMatrix<F> {
    values: Array2<F>,
    feature_names: Vec<String>,
    filled: Vec<bool>,
}

impl<F: Float> PredictionMatrix<F> {
    pub fn new(nsamples: usize, feature_names: Vec<String>) -> Self {
        let nfeatures = feature_names.len();
        PredictionMatrix {
            values: Array2::zeros((nsamples, nfeatures)),
            feature_names,
            filled: vec![false; nfeatures],
        }
    }

    pub fn insert(&mut self, feature: usize, column: ArrayView1<F>) -> Result<()> {
        if feature >= self.nfeatures() {
            return Err(Error::shape_mismatch(
                "prediction matrix columns",
                self.nfeatures(),
                feature + 1,
            ));
        }
        ensure_len(
            &format!("prediction column {}", self.feature_names[feature]),
            self.nsamples(),
            column.len(),
        )?;
        if self.filled[feature] {
            return Err(Error::MalformedInput(format!(
                "prediction column {} written twice",
                self.feature_names[feature]
            )));
        }
        self.values.column_mut(feature).assign(&column);
        self.filled[feature] = true;
        Ok(())
    }

    pub fn nsamples(&self) -> usize {
        self.values.nrows()
    }

    pub fn nfeatures(&self) -> usize {
        self.values.ncols()
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn is_complete(&self) -> bool {
        self.filled.iter().all(|x| *x)
    }

    pub fn column(&self, feature: usize) -> ArrayView1<F> {
        self.values.column(feature)
    }

    pub fn view(&self) -> ArrayView2<F> {
        self.values.view()
    }

    /// Row-wise mean of the columns written so far
    pub fn mean_of_filled(&self) -> Array1<F> {
        let filled = (0..self.nfeatures())
            .filter(|f| self.filled[*f])
            .collect::<Vec<_>>();
        if filled.is_empty() {
            return Array1::zeros(self.nsamples());
        }
        self.values
            .select(Axis(1), &filled)
            .mean_axis(Axis(1))
            .unwrap_or_else(|| Array1::zeros(self.nsamples()))
    }

    /// The matrix, failing if a column was never written
    pub fn into_array(self) -> Result<Array2<F>> {
        if let Some(feature) = self.filled.iter().position(|x| !x) {
            return Err(Error::MalformedInput(format!(
                "prediction column {} was never written",
                self.feature_names[feature]
            )));
        }
        Ok(self.values)
    }
}
