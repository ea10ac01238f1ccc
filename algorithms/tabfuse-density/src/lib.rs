//!
//! # Density features
//!
//! `tabfuse-density` derives three columns for every numeric feature from the empirical
//! distribution of its values:
//!
//! * **count**: how often the (discretized) value occurs in the fitted population,
//! * **density**: the value-count histogram smoothed with a Gaussian kernel,
//! * **deviation**: `count / (density + eps)`, large where a value is more frequent than its
//!   neighbourhood suggests.
//!
//! Values are discretized by rounding to a fixed number of decimal digits. The smoothing
//! bandwidth grows with the cube root of the histogram length, so features with a wide value
//! range are smoothed over more grid points.
//!
//! ```rust
//! use tabfuse::prelude::*;
//! use tabfuse_density::Density;
//! use ndarray::array;
//!
//! let pooled = DatasetBase::from(array![[1.0, 0.3], [1.0, 0.4], [2.0, 0.4]]);
//! let fitted = Density::params().fit(&pooled).unwrap();
//!
//! let features = fitted.transform(pooled.records()).unwrap();
//! assert_eq!(features.count.column(0).to_vec(), vec![2.0, 2.0, 1.0]);
//! ```

mod algorithm;
mod gaussian;
mod histogram;
mod hyperparams;

pub use algorithm::{DensityFeatures, FeatureStats, FittedDensity};
pub use gaussian::{gaussian_filter1d, gaussian_kernel};
pub use histogram::{Discretizer, FeatureHistogram};
pub use hyperparams::{Density, DensityParams, DensityValidParams};

pub use tabfuse::error::Result;
