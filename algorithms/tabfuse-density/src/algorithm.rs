use ndarray::{Array1, Array2, ArrayBase, Axis, Data, Ix2};
use tracing::{debug, info, warn};

use tabfuse::{
    dataset::{DatasetBase, Records},
    error::{Error, Result},
    traits::{Fit, Transformer},
    Float,
};

use crate::gaussian::gaussian_filter1d;
use crate::histogram::{Discretizer, FeatureHistogram};
use crate::hyperparams::DensityValidParams;

#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

/// Count, smoothed density and deviation of one feature, indexed by discretized value
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureStats<F> {
    offset: i64,
    counts: Array1<F>,
    density: Array1<F>,
    deviation: Array1<F>,
    sigma: F,
}

impl<F: Float> FeatureStats<F> {
    fn from_histogram(hist: FeatureHistogram, params: &DensityValidParams) -> Self {
        let sigma = params.sigma(hist.len());
        let smooth = gaussian_filter1d(hist.counts(), sigma, params.truncate());
        let deviation = hist
            .counts()
            .iter()
            .zip(smooth.iter())
            .map(|(c, d)| F::cast(c / (d + params.eps())))
            .collect::<Array1<F>>();

        FeatureStats {
            offset: hist.offset(),
            counts: hist.counts().iter().map(|c| F::cast(*c)).collect(),
            density: smooth.into_iter().map(F::cast).collect(),
            deviation,
            sigma: F::cast(sigma),
        }
    }

    /// Smallest discretized value of the fitted population
    pub fn offset(&self) -> i64 {
        self.offset
    }

    pub fn counts(&self) -> &Array1<F> {
        &self.counts
    }

    pub fn density(&self) -> &Array1<F> {
        &self.density
    }

    pub fn deviation(&self) -> &Array1<F> {
        &self.deviation
    }

    /// Smoothing bandwidth in bins
    pub fn sigma(&self) -> F {
        self.sigma
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// (count, density, deviation) at a discretized value, `None` outside the fitted range
    pub fn lookup(&self, key: i64) -> Option<(F, F, F)> {
        let idx = key.checked_sub(self.offset)?;
        if idx < 0 || idx as usize >= self.counts.len() {
            return None;
        }
        let idx = idx as usize;
        Some((self.counts[idx], self.density[idx], self.deviation[idx]))
    }

    fn is_degenerate(&self) -> bool {
        self.counts.len() == 1 || self.density.iter().all(|d| *d == F::zero())
    }
}

/// The three derived matrices, each with one column per input feature
#[derive(Debug, Clone, PartialEq)]
pub struct DensityFeatures<F> {
    pub count: Array2<F>,
    pub density: Array2<F>,
    pub deviation: Array2<F>,
}

impl<F: Float> DensityFeatures<F> {
    pub fn nsamples(&self) -> usize {
        self.count.nrows()
    }

    pub fn nfeatures(&self) -> usize {
        self.count.ncols()
    }

    /// Rows `indices` of all three matrices, in the given order
    pub fn select(&self, indices: &[usize]) -> Self {
        DensityFeatures {
            count: self.count.select(Axis(0), indices),
            density: self.density.select(Axis(0), indices),
            deviation: self.deviation.select(Axis(0), indices),
        }
    }
}

/// Per-feature statistics of a fitted population
///
/// Fit once on the pooled train and real test records. Every partition, the synthetic one
/// included, is then transformed by looking its discretized values up in these statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct FittedDensity<F> {
    discretizer: Discretizer,
    stats: Vec<FeatureStats<F>>,
    feature_names: Vec<String>,
}

impl<F: Float> FittedDensity<F> {
    pub fn stats(&self) -> &[FeatureStats<F>] {
        &self.stats
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn nfeatures(&self) -> usize {
        self.stats.len()
    }
}

impl<F: Float, D: Data<Elem = F>, T> Fit<ArrayBase<D, Ix2>, T, Error> for DensityValidParams {
    type Object = FittedDensity<F>;

    fn fit(&self, dataset: &DatasetBase<ArrayBase<D, Ix2>, T>) -> Result<Self::Object> {
        if dataset.nsamples() == 0 {
            return Err(Error::NotEnoughSamples);
        }

        let discretizer = Discretizer::new(self.precision());
        let feature_names = dataset.feature_names();
        let mut stats = Vec::with_capacity(dataset.nfeatures());

        for (column, name) in dataset.records().axis_iter(Axis(1)).zip(&feature_names) {
            let keys = column
                .iter()
                .map(|x| discretizer.key(*x))
                .collect::<Result<Vec<_>>>()?;
            let hist = FeatureHistogram::from_keys(&keys)?;
            let feature = FeatureStats::from_histogram(hist, self);

            if feature.is_degenerate() {
                warn!(
                    feature = %name,
                    bins = feature.len(),
                    "degenerate density, derived columns carry no information"
                );
            }
            debug!(feature = %name, bins = feature.len(), sigma = %feature.sigma(), "density fitted");
            stats.push(feature);
        }

        info!(
            features = stats.len(),
            samples = dataset.nsamples(),
            "density statistics fitted"
        );

        Ok(FittedDensity {
            discretizer,
            stats,
            feature_names,
        })
    }
}

impl<F: Float, D: Data<Elem = F>> Transformer<&ArrayBase<D, Ix2>, Result<DensityFeatures<F>>>
    for FittedDensity<F>
{
    /// Looks every value up in the fitted statistics
    ///
    /// Values that fall outside the fitted range of their feature receive zero for all three
    /// derived columns. This can only happen for records that were not part of the fitted
    /// population.
    fn transform(&self, x: &ArrayBase<D, Ix2>) -> Result<DensityFeatures<F>> {
        if x.ncols() != self.stats.len() {
            return Err(Error::shape_mismatch(
                "density transform columns",
                self.stats.len(),
                x.ncols(),
            ));
        }

        let shape = x.raw_dim();
        let mut count = Array2::zeros(shape.clone());
        let mut density = Array2::zeros(shape.clone());
        let mut deviation = Array2::zeros(shape);
        let mut out_of_range = 0usize;

        for (j, (column, feature)) in x.axis_iter(Axis(1)).zip(&self.stats).enumerate() {
            for (i, value) in column.iter().enumerate() {
                let key = self.discretizer.key(*value)?;
                match feature.lookup(key) {
                    Some((c, d, v)) => {
                        count[[i, j]] = c;
                        density[[i, j]] = d;
                        deviation[[i, j]] = v;
                    }
                    None => out_of_range += 1,
                }
            }
        }

        if out_of_range > 0 {
            warn!(
                values = out_of_range,
                "values outside the fitted density range, derived columns set to zero"
            );
        }

        Ok(DensityFeatures {
            count,
            density,
            deviation,
        })
    }
}
