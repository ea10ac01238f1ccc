use super::{AsTargets, DatasetBase, Records};
use ndarray::{Array1, Array2, ArrayBase, ArrayView1, ArrayView2, Axis, Data, Ix1, Ix2};

impl<R: Records, T> DatasetBase<R, T> {
    /// Create a new dataset from records and targets
    pub fn new(records: R, targets: T) -> DatasetBase<R, T> {
        DatasetBase {
            records,
            targets,
            feature_names: Vec::new(),
        }
    }

    /// Returns reference to the records
    pub fn records(&self) -> &R {
        &self.records
    }

    /// Returns reference to the targets
    pub fn targets(&self) -> &T {
        &self.targets
    }

    /// Number of samples in the dataset
    pub fn nsamples(&self) -> usize {
        self.records.nsamples()
    }

    /// Number of features in the dataset
    pub fn nfeatures(&self) -> usize {
        self.records.nfeatures()
    }

    /// Returns feature names
    ///
    /// A feature name gives a human-readable string describing the purpose of a single feature.
    /// If no names were set, `feature-{i}` is returned for each column.
    pub fn feature_names(&self) -> Vec<String> {
        if !self.feature_names.is_empty() {
            self.feature_names.clone()
        } else {
            (0..self.records.nfeatures())
                .map(|idx| format!("feature-{}", idx))
                .collect()
        }
    }

    /// Updates the feature names of a dataset
    pub fn with_feature_names<I: Into<String>>(mut self, names: Vec<I>) -> DatasetBase<R, T> {
        let feature_names = names.into_iter().map(|x| x.into()).collect();

        self.feature_names = feature_names;

        self
    }

    /// Updates the records of a dataset, keeping targets and feature names
    pub fn with_records<R2: Records>(self, records: R2) -> DatasetBase<R2, T> {
        DatasetBase {
            records,
            targets: self.targets,
            feature_names: self.feature_names,
        }
    }

    /// Updates the targets of a dataset, keeping records and feature names
    pub fn with_targets<T2>(self, targets: T2) -> DatasetBase<R, T2> {
        DatasetBase {
            records: self.records,
            targets,
            feature_names: self.feature_names,
        }
    }
}

impl<F: Clone, S: Data<Elem = F>, T: Data<Elem = bool>>
    DatasetBase<ArrayBase<S, Ix2>, ArrayBase<T, Ix1>>
{
    /// Creates a view of the dataset
    pub fn view(&self) -> DatasetBase<ArrayView2<'_, F>, ArrayView1<'_, bool>> {
        DatasetBase {
            records: self.records.view(),
            targets: self.targets.view(),
            feature_names: self.feature_names.clone(),
        }
    }

    /// Copies the samples at `indices`, in the given order, into a new owned dataset
    pub fn select(&self, indices: &[usize]) -> DatasetBase<Array2<F>, Array1<bool>> {
        DatasetBase {
            records: self.records.select(Axis(0), indices),
            targets: self.targets.select(Axis(0), indices),
            feature_names: self.feature_names.clone(),
        }
    }

    /// Single-column dataset of feature `idx` with the same targets
    pub fn feature(&self, idx: usize) -> DatasetBase<Array2<F>, Array1<bool>> {
        let name = self.feature_names().swap_remove(idx);
        DatasetBase {
            records: self.records.select(Axis(1), &[idx]),
            targets: self.targets.to_owned(),
            feature_names: vec![name],
        }
    }

    /// Number of (positive, negative) samples
    pub fn class_counts(&self) -> (usize, usize) {
        let targets = self.targets.as_targets();
        let positives = targets.iter().filter(|x| **x).count();
        (positives, targets.len() - positives)
    }
}

impl<F> From<Array2<F>> for DatasetBase<Array2<F>, ()> {
    fn from(records: Array2<F>) -> Self {
        DatasetBase::new(records, ())
    }
}

impl<'a, F> From<ArrayView2<'a, F>> for DatasetBase<ArrayView2<'a, F>, ()> {
    fn from(records: ArrayView2<'a, F>) -> Self {
        DatasetBase::new(records, ())
    }
}

impl<F> From<(Array2<F>, Array1<bool>)> for DatasetBase<Array2<F>, Array1<bool>> {
    fn from(rec_tar: (Array2<F>, Array1<bool>)) -> Self {
        DatasetBase::new(rec_tar.0, rec_tar.1)
    }
}
