//! Provide traits for different classes of algorithms
//!

use crate::dataset::{DatasetBase, Records};

/// Transformation algorithms
///
/// A transformer takes a dataset and transforms it into a different one. It has no concept of
/// state and provides therefore no method to predict new data. A typical example are feature
/// scalers once their statistics have been fitted.
pub trait Transformer<R, T> {
    fn transform(&self, x: R) -> T;
}

/// Fittable algorithms
///
/// A fittable algorithm takes a dataset and creates a concept of some kind about it. The concept
/// is returned as an object and can be used to transform or predict new data.
///
/// The error type `E` has to be convertible from the core error so that shape checks inside
/// `fit` can be propagated with `?`.
pub trait Fit<R: Records, T, E: std::error::Error + From<crate::error::Error>> {
    type Object;

    fn fit(&self, dataset: &DatasetBase<R, T>) -> Result<Self::Object, E>;
}

/// Predict probabilities of the positive class for a set of records
pub trait PredictProba<R, T> {
    fn predict_proba(&self, x: R) -> T;
}
