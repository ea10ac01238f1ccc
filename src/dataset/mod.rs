//! Datasets
//!
//! This module implements the dataset struct and the helper traits the algorithm crates build
//! on.
use ndarray::{Array1, Array2, ArrayBase, ArrayView1, ArrayView2, Data, Ix1, Ix2, NdFloat};

use num_traits::{AsPrimitive, FromPrimitive, NumCast, Signed};
use rand::distributions::uniform::SampleUniform;

use std::iter::Sum;

mod impl_dataset;

/// Floating point numbers
///
/// This trait bound multiplexes to the most common assumption of floating point number and
/// implement them for 32bit and 64bit floating points. They are used in the records of a
/// dataset and in every derived feature matrix.
pub trait Float:
    NdFloat
    + FromPrimitive
    + Default
    + Signed
    + Sum
    + AsPrimitive<usize>
    + SampleUniform
    + approx::AbsDiffEq<Epsilon = Self>
{
    fn cast<T: NumCast>(x: T) -> Self {
        NumCast::from(x).unwrap()
    }
}

impl Float for f32 {}

impl Float for f64 {}

/// DatasetBase
///
/// This is the fundamental structure of a dataset. It contains a number of records about the data
/// and may contain targets and feature names. In order to keep the type complexity low the
/// dataset base is only generic over the records and targets and introduces a trait bound on
/// the records. `feature_names` are always owned and copied when views are created.
///
/// # Fields
///
/// * `records`: a two-dimensional matrix with dimensionality (nsamples, nfeatures)
/// * `targets`: a one-dimensional vector of binary labels with dimensionality (nsamples), or `()`
/// for unlabeled records
/// * `feature_names`: optional descriptive feature names with dimensionality (nfeatures)
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetBase<R, T>
where
    R: Records,
{
    pub records: R,
    pub targets: T,

    feature_names: Vec<String>,
}

/// Dataset
///
/// The most commonly used type of dataset. It contains a number of records stored as an
/// `Array2` and one binary target per record.
pub type Dataset<F> = DatasetBase<Array2<F>, Array1<bool>>;

/// DatasetView
///
/// A read only view of a Dataset
pub type DatasetView<'a, F> = DatasetBase<ArrayView2<'a, F>, ArrayView1<'a, bool>>;

/// Record trait
pub trait Records: Sized {
    type Elem;

    fn nsamples(&self) -> usize;
    fn nfeatures(&self) -> usize;
}

impl<F, S: Data<Elem = F>> Records for ArrayBase<S, Ix2> {
    type Elem = F;

    fn nsamples(&self) -> usize {
        self.nrows()
    }

    fn nfeatures(&self) -> usize {
        self.ncols()
    }
}

/// Targets which can be read as a vector of binary labels
pub trait AsTargets {
    fn as_targets(&self) -> ArrayView1<bool>;
}

impl<S: Data<Elem = bool>> AsTargets for ArrayBase<S, Ix1> {
    fn as_targets(&self) -> ArrayView1<bool> {
        self.view()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn dataset_implements_required_methods() {
        let dataset = Dataset::new(
            array![[1., 2.], [3., 4.], [5., 6.]],
            array![true, false, true],
        );

        assert_eq!(dataset.nsamples(), 3);
        assert_eq!(dataset.nfeatures(), 2);
        assert_eq!(dataset.feature_names(), vec!["feature-0", "feature-1"]);

        let dataset = dataset.with_feature_names(vec!["var_0", "var_1"]);
        assert_eq!(dataset.feature_names(), vec!["var_0", "var_1"]);
        assert_eq!(dataset.targets().as_targets(), array![true, false, true]);
    }

    #[test]
    fn select_keeps_names_and_order() {
        let dataset = Dataset::new(
            array![[1., 2.], [3., 4.], [5., 6.], [7., 8.]],
            array![true, false, true, false],
        )
        .with_feature_names(vec!["a", "b"]);

        let subset = dataset.select(&[3, 0]);
        assert_eq!(subset.records(), &array![[7., 8.], [1., 2.]]);
        assert_eq!(subset.targets(), &array![false, true]);
        assert_eq!(subset.feature_names(), vec!["a", "b"]);

        let view = dataset.view();
        assert_eq!(view.nsamples(), 4);
        assert_eq!(view.feature_names(), vec!["a", "b"]);
    }

    #[test]
    fn feature_column_is_single_column_dataset() {
        let dataset = Dataset::new(array![[1., 2.], [3., 4.]], array![true, false])
            .with_feature_names(vec!["a", "b"]);
        let column = dataset.feature(1);
        assert_eq!(column.records(), &array![[2.], [4.]]);
        assert_eq!(column.feature_names(), vec!["b"]);
    }

    #[test]
    fn class_counts() {
        let dataset = Dataset::new(
            Array2::<f64>::zeros((5, 1)),
            array![true, false, true, true, false],
        );
        assert_eq!(dataset.class_counts(), (3, 2));
        let empty = Dataset::new(Array2::<f64>::zeros((0, 1)), Array1::from(Vec::new()));
        assert_eq!(empty.class_counts(), (0, 0));
    }
}
