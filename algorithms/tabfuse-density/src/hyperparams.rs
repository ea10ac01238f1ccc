use tabfuse::{error::Error, error::Result, ParamGuard};

#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

/// Checked hyperparameters of the density transform
///
/// See [`DensityParams`] for the meaning of every field.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DensityValidParams {
    precision: u32,
    sigma_base: f64,
    sigma_scale: f64,
    truncate: f64,
    eps: f64,
}

impl DensityValidParams {
    /// Number of decimal digits kept when discretizing
    pub fn precision(&self) -> u32 {
        self.precision
    }

    pub fn sigma_base(&self) -> f64 {
        self.sigma_base
    }

    pub fn sigma_scale(&self) -> f64 {
        self.sigma_scale
    }

    /// Kernel radius in multiples of the bandwidth
    pub fn truncate(&self) -> f64 {
        self.truncate
    }

    pub fn eps(&self) -> f64 {
        self.eps
    }

    /// Smoothing bandwidth for a histogram with `len` bins
    ///
    /// The geometric mean of `sigma_base` (twice) and a length dependent term
    /// `len * sigma_scale`.
    pub fn sigma(&self, len: usize) -> f64 {
        (self.sigma_base * self.sigma_base * (len as f64) * self.sigma_scale).cbrt()
    }
}

/// Hyperparameters of the density transform
///
/// ### Example
///
/// ```rust
/// use tabfuse::prelude::*;
/// use tabfuse_density::Density;
/// use ndarray::array;
///
/// let pooled = DatasetBase::from(array![[0.1], [0.2], [0.2], [0.3]]);
/// let fitted = Density::params().precision(1).fit(&pooled).unwrap();
/// let features = fitted.transform(pooled.records()).unwrap();
/// assert_eq!(features.count[[1, 0]], 2.0);
/// ```
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DensityParams(DensityValidParams);

impl DensityParams {
    pub fn new() -> Self {
        Self(DensityValidParams {
            precision: 4,
            sigma_base: 4.0,
            sigma_scale: 0.001,
            truncate: 4.0,
            eps: 1e-8,
        })
    }

    /// Sets the number of decimal digits a value is rounded to before counting
    pub fn precision(mut self, precision: u32) -> Self {
        self.0.precision = precision;
        self
    }

    /// Sets the fixed part of the smoothing bandwidth
    pub fn sigma_base(mut self, sigma_base: f64) -> Self {
        self.0.sigma_base = sigma_base;
        self
    }

    /// Sets the factor scaling the bandwidth with the histogram length
    pub fn sigma_scale(mut self, sigma_scale: f64) -> Self {
        self.0.sigma_scale = sigma_scale;
        self
    }

    /// Sets the Gaussian kernel radius in multiples of the bandwidth
    pub fn truncate(mut self, truncate: f64) -> Self {
        self.0.truncate = truncate;
        self
    }

    /// Sets the offset added to the density before dividing the count by it
    pub fn eps(mut self, eps: f64) -> Self {
        self.0.eps = eps;
        self
    }
}

impl Default for DensityParams {
    fn default() -> Self {
        Self::new()
    }
}

/// Marker type to create density parameters
pub struct Density;

impl Density {
    /// Defaults are provided if the optional parameters are not specified:
    /// * `precision = 4`
    /// * `sigma_base = 4.0`
    /// * `sigma_scale = 0.001`
    /// * `truncate = 4.0`
    /// * `eps = 1e-8`
    pub fn params() -> DensityParams {
        DensityParams::new()
    }
}

impl ParamGuard for DensityParams {
    type Checked = DensityValidParams;
    type Error = Error;

    fn check_ref(&self) -> Result<&Self::Checked> {
        let p = &self.0;
        if p.precision > 9 {
            Err(Error::Parameters(format!(
                "Precision should be at most 9 digits, but was {}",
                p.precision
            )))
        } else if !(p.sigma_base > 0.0) || !p.sigma_base.is_finite() {
            Err(Error::Parameters(format!(
                "Sigma base should be positive, but was {}",
                p.sigma_base
            )))
        } else if !(p.sigma_scale > 0.0) || !p.sigma_scale.is_finite() {
            Err(Error::Parameters(format!(
                "Sigma scale should be positive, but was {}",
                p.sigma_scale
            )))
        } else if !(p.truncate > 0.0) || !p.truncate.is_finite() {
            Err(Error::Parameters(format!(
                "Truncate should be positive, but was {}",
                p.truncate
            )))
        } else if !(p.eps > 0.0) {
            Err(Error::Parameters(format!(
                "Epsilon should be positive, but was {}",
                p.eps
            )))
        } else {
            Ok(&self.0)
        }
    }

    fn check(self) -> Result<Self::Checked> {
        self.check_ref()?;
        Ok(self.0)
    }
}
