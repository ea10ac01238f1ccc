//!
//! # Fusion network
//!
//! `tabfuse-fusion` fuses the per-feature outputs of the tree stage with a tiny 1-D
//! convolutional network.
//!
//! The input of one sample holds five values per feature: the squashed tree prediction and the
//! standardized raw value, count, deviation and density. [`FusionSchema`] fixes the order of
//! those blocks by feature name. A convolution with kernel and stride five maps every block to
//! 32 channels, three pointwise convolutions shrink that to four, and only then are features
//! combined: the per-feature outputs are flattened, averaged in adjacent pairs, normalized and
//! fed to a single sigmoid unit. With 200 features the network has 2797 weights.
//!
//! The layers, automatic differentiation and the optimizer come from `candle`.
//! [`FusionTrainer`] trains one network per fold with Adam and a stepped learning rate and
//! averages the fold models into out-of-fold, test and fake predictions.
//!
//! ```rust
//! use ndarray::Array2;
//! use tabfuse::ParamGuard;
//! use tabfuse_fusion::FusionTrainer;
//!
//! let x = Array2::from_shape_fn((60, 10), |(i, j)| ((i * 7 + j * 3) % 11) as f32 / 11.0 - 0.5);
//! let targets = (0..60).map(|i| x[[i, 0]] > 0.0).collect::<Vec<_>>();
//!
//! let (predictions, report) = FusionTrainer::params()
//!     .n_folds(3)
//!     .epochs(2)
//!     .batch_size(16)
//!     .check()
//!     .unwrap()
//!     .fit_predict(x.view(), &targets, x.view(), x.view(), None)
//!     .unwrap();
//! assert_eq!(predictions.oof.len(), 60);
//! assert_eq!(report.folds.len(), 3);
//! ```

mod error;
mod network;
mod optimizer;
mod schema;
mod trainer;

pub use error::{FusionError, Result};
pub use network::{
    accuracy, binary_cross_entropy, Checkpoint, FusionNetwork, PoolLayout, CHANNELS,
};
pub use optimizer::Adam;
pub use schema::{FusionInputs, FusionSchema, SlotKind, DEFAULT_SLOT_ORDER, SLOTS};
pub use trainer::{
    EpochRecord, FoldReport, FusionPredictions, FusionReport, FusionTrainer, FusionTrainerParams,
    FusionTrainerValidParams,
};
