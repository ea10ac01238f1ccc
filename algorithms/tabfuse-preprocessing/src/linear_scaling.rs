//! Standard scaling of feature columns

use crate::error::{PreprocessingError, Result};
use approx::abs_diff_eq;
use ndarray::{Array1, Array2, ArrayBase, Axis, Data, Ix2, Zip};
use tabfuse::dataset::DatasetBase;
use tabfuse::error::Error;
use tabfuse::traits::{Fit, Transformer};
use tabfuse::Float;
use tracing::debug;

#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

/// Standard scaler: learns the mean and standard deviation of every column of a fitting
/// population, producing a [fitted linear scaler](struct.FittedLinearScaler.html) that maps
/// any later partition with the same parameters.
///
/// ### Example
///
/// ```rust
/// use tabfuse::traits::{Fit, Transformer};
/// use tabfuse::DatasetBase;
/// use tabfuse_preprocessing::linear_scaling::LinearScaler;
/// use ndarray::array;
///
/// let pooled = DatasetBase::from(array![[1., 10.], [2., 20.], [3., 30.]]);
/// // Learn scaling parameters
/// let scaler = LinearScaler::standard().fit(&pooled).unwrap();
/// // scale records according to parameters
/// let scaled = scaler.transform(pooled.records().clone()).unwrap();
/// assert_eq!(scaled.column(0).sum(), 0.);
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LinearScaler;

impl LinearScaler {
    /// Subtracts the mean of each column and scales it by the inverse of its standard deviation
    pub fn standard() -> Self {
        LinearScaler
    }
}

impl<F: Float, D: Data<Elem = F>, T> Fit<ArrayBase<D, Ix2>, T, PreprocessingError>
    for LinearScaler
{
    type Object = FittedLinearScaler<F>;

    /// Fits offsets and scales on the records of `x`. Fails if the dataset has no samples or
    /// holds a non-finite value.
    fn fit(&self, x: &DatasetBase<ArrayBase<D, Ix2>, T>) -> Result<Self::Object> {
        FittedLinearScaler::standard(x.records())
    }
}

#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Debug, Clone, PartialEq)]
/// The result of fitting a [linear scaler](struct.LinearScaler.html).
/// Scales datasets with the parameters learned during fitting.
pub struct FittedLinearScaler<F> {
    offsets: Array1<F>,
    scales: Array1<F>,
}

impl<F: Float> FittedLinearScaler<F> {
    pub(crate) fn standard<D: Data<Elem = F>>(records: &ArrayBase<D, Ix2>) -> Result<Self> {
        if records.dim().0 == 0 {
            return Err(PreprocessingError::NotEnoughSamples);
        }
        if records.iter().any(|x| !x.is_finite()) {
            return Err(PreprocessingError::InvalidFloat);
        }
        let means = records
            .mean_axis(Axis(0))
            .ok_or(PreprocessingError::NotEnoughSamples)?;
        let std_devs = records.std_axis(Axis(0), F::zero()).mapv(|s| {
            if abs_diff_eq!(s, F::zero()) {
                // if feature is constant then don't scale
                F::one()
            } else {
                F::one() / s
            }
        });
        debug!(
            columns = records.ncols(),
            samples = records.nrows(),
            "standard scaler fitted"
        );
        Ok(Self {
            offsets: means,
            scales: std_devs,
        })
    }

    /// Array of size `n_features` that contains the offset that will be subtracted to each feature
    pub fn offsets(&self) -> &Array1<F> {
        &self.offsets
    }

    /// Array of size `n_features` that contains the scale that will be applied to each feature
    pub fn scales(&self) -> &Array1<F> {
        &self.scales
    }

    fn check_columns(&self, ncols: usize) -> Result<()> {
        if ncols != self.offsets.len() {
            return Err(
                Error::shape_mismatch("scaler columns", self.offsets.len(), ncols).into(),
            );
        }
        Ok(())
    }

    /// Maps scaled records back onto the scale of the fitted population
    pub fn inverse_transform(&self, x: Array2<F>) -> Result<Array2<F>> {
        if x.is_empty() {
            return Ok(x);
        }
        self.check_columns(x.ncols())?;
        let mut x = x;
        Zip::from(x.columns_mut())
            .and(self.offsets())
            .and(self.scales())
            .for_each(|mut col, &offset, &scale| col.mapv_inplace(|el| el / scale + offset));
        Ok(x)
    }
}

impl<F: Float> Transformer<Array2<F>, Result<Array2<F>>> for FittedLinearScaler<F> {
    /// Scales an array of size (nsamples, nfeatures) according to the scaler's `offsets` and `scales`.
    /// Fails if the number of columns differs from the records used for fitting.
    fn transform(&self, x: Array2<F>) -> Result<Array2<F>> {
        if x.is_empty() {
            return Ok(x);
        }
        self.check_columns(x.ncols())?;
        let mut x = x;
        Zip::from(x.columns_mut())
            .and(self.offsets())
            .and(self.scales())
            .for_each(|mut col, &offset, &scale| col.mapv_inplace(|el| (el - offset) * scale));
        Ok(x)
    }
}

impl<F: Float, D: Data<Elem = F>, T>
    Transformer<DatasetBase<ArrayBase<D, Ix2>, T>, Result<DatasetBase<Array2<F>, T>>>
    for FittedLinearScaler<F>
{
    /// Substitutes the records of the dataset with their scaled version.
    fn transform(&self, x: DatasetBase<ArrayBase<D, Ix2>, T>) -> Result<DatasetBase<Array2<F>, T>> {
        let transformed_records = self.transform(x.records.to_owned())?;
        Ok(x.with_records(transformed_records))
    }
}
