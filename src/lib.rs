//! `tabfuse` provides the shared building blocks of a two-stage ensembling pipeline for tabular
//! binary classification.
//!
//! The pipeline trains one gradient-boosted tree ensemble per input feature and fuses the
//! per-feature outputs with a tiny convolutional network. The algorithm crates live under
//! `algorithms/`:
//!
//! * `tabfuse-density`: per-feature histogram, smoothed density and deviation features
//! * `tabfuse-preprocessing`: standard scaling
//! * `tabfuse-trees`: histogram gradient boosting and the per-feature ensemble
//! * `tabfuse-fusion`: the convolutional ensembler
//!
//! This crate contains what all of them share: the [`DatasetBase`](dataset::DatasetBase)
//! container, the [`Fit`](traits::Fit) and [`Transformer`](traits::Transformer) traits,
//! checked hyperparameters through [`ParamGuard`], cross-validation splitters and the
//! classification metrics used for diagnostics.
//!

pub mod dataset;
pub mod error;
pub mod folds;
mod metrics_classification;
mod param_guard;
pub mod prelude;
pub mod traits;

pub use dataset::{Dataset, DatasetBase, DatasetView, Float};
pub use param_guard::ParamGuard;

/// Common metrics functions for binary classification
pub mod metrics {
    pub use crate::metrics_classification::{
        BinaryClassification, ReceiverOperatingCharacteristic,
    };
}
