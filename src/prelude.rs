//! Tabfuse prelude.
//!
//! This module contains the most used types, type aliases, traits and
//! functions that you can import easily as a group.
//!

#[doc(no_inline)]
pub use crate::error::{Error, Result};

#[doc(no_inline)]
pub use crate::traits::*;

#[doc(no_inline)]
pub use crate::dataset::{AsTargets, Dataset, DatasetBase, DatasetView, Float, Records};

#[doc(no_inline)]
pub use crate::folds::{FoldIndices, KFold};

#[doc(no_inline)]
pub use crate::metrics_classification::BinaryClassification;

#[doc(no_inline)]
pub use crate::param_guard::ParamGuard;
