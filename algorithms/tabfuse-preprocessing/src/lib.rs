//! # Preprocessing
//!
//! `tabfuse-preprocessing` holds the feature scaling used before the fusion network consumes
//! raw and count features.
//!
//! The [`LinearScaler`](linear_scaling::LinearScaler) learns one offset and one scale per
//! column from a fitting population and applies the same affine map to every later partition.

pub mod error;
pub mod linear_scaling;

pub use error::{PreprocessingError, Result};
pub use linear_scaling::{FittedLinearScaler, LinearScaler};
