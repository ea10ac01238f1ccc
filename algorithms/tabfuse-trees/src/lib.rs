//!
//! # Boosted trees
//!
//! `tabfuse-trees` provides histogram-based gradient boosting for binary classification and the
//! per-feature ensemble built on top of it.
//!
//! ## Gradient boosting
//!
//! [`GradientBoostedTrees`] grows regression trees leaf by leaf on the gradients of the binary
//! log-loss. Split candidates come from per-feature histograms with at most `max_bin` bins,
//! leaf values are shrunk by L1 and L2 penalties. Histograms are built in parallel on a
//! dedicated worker pool, everything else is serial.
//!
//! ## Per-feature ensemble
//!
//! [`PerFeatureEnsemble`] trains one univariate booster per feature and fold. No tree ever sees
//! more than one feature, so the per-feature predictions stay independent until they are fused
//! later on. The results are four [`PredictionMatrix`] values with one column per feature:
//! held-out, in-fold training, test and fake predictions, all squashed by
//! `sqrt(p - mean(p) + 0.1)`.
//!
//! ```rust
//! use tabfuse::prelude::*;
//! use tabfuse_trees::{GradientBoostedTrees, PerFeatureEnsemble};
//! use ndarray::{Array1, Array2};
//!
//! let records = Array2::from_shape_fn((100, 2), |(i, j)| ((i * (j + 1)) % 10) as f64);
//! let targets = Array1::from_shape_fn(100, |i| i % 10 >= 5);
//! let train = Dataset::new(records.clone(), targets);
//!
//! let (predictions, report) = PerFeatureEnsemble::params()
//!     .n_folds(3)
//!     .base(GradientBoostedTrees::<f64>::params().num_boost_round(20).num_threads(1))
//!     .check()
//!     .unwrap()
//!     .fit_predict(&train, records.view(), records.view(), None)
//!     .unwrap();
//! assert_eq!(predictions.oof.nfeatures(), 2);
//! assert_eq!(report.chosen_settings(), vec![0, 0]);
//! ```

pub mod ensemble;
pub mod error;
mod gbdt;
pub mod table;

pub use ensemble::*;
pub use error::{Result, TreesError};
pub use gbdt::*;
pub use table::{FeatureHyperparams, HyperparameterTable};
