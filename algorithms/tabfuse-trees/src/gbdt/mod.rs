mod algorithm;
mod binning;
mod histogram;
mod hyperparams;
mod tree;

pub use algorithm::{EvalRecord, GradientBoostedTrees};
pub use binning::{BinMapper, BinnedMatrix};
pub use histogram::{BinStats, Histogram};
pub use hyperparams::{GbdtParams, GbdtValidParams};
pub use tree::{Tree, TreeNode};
