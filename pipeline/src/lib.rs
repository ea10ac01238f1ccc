//!
//! # Pipeline driver
//!
//! `tabfuse-pipeline` wires the algorithm crates into the full two-stage pipeline:
//!
//! 1. load the train and test tables and the index lists of the test table ([`io`])
//! 2. build train, real test and fake partitions ([`partition`])
//! 3. fit density statistics on train plus real test and derive count, density and deviation
//! 4. standardize raw and count columns
//! 5. train the per-feature tree ensemble
//! 6. fuse its outputs with the convolutional network
//! 7. scatter real and fake predictions back into a submission ([`submission`])
//!
//! [`Driver`] runs steps 2 to 7 on in-memory tables, the `tabfuse` binary adds file handling
//! and logging around it.

pub mod config;
mod driver;
pub mod error;
pub mod io;
pub mod partition;
pub mod submission;

pub use config::PipelineConfig;
pub use driver::{
    derive_density, standardize, AugmentedFeatures, Driver, PipelineInputs, PipelineOutput,
};
pub use error::{PipelineError, Result};
pub use partition::{PartitionPolicy, Partitions, TestIndices};
pub use submission::Submission;
