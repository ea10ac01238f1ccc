//! Train / test-real / test-fake partitions
//!
//! Production mode scores the real test rows and carries the synthetic rows along. Experimental
//! mode holds out part of the labeled training table instead, so that every partition has
//! targets. Both produce the same [`Partitions`].

use ndarray::{Array1, Array2, Axis};
use rand::{seq::SliceRandom, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;
use serde_crate::{Deserialize, Serialize};
use tracing::info;

use crate::error::{PipelineError, Result};
use crate::io::Table;

/// Where the nominal test and fake partitions come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(crate = "serde_crate", rename_all = "snake_case")]
pub enum PartitionPolicy {
    /// Real test rows are the public and private rows of the test table, fake rows are its
    /// synthetic rows
    Production,
    /// The shuffled training table is split after `train_len` rows. The remainder becomes the
    /// test partition and a copy of it the fake partition.
    Experimental { train_len: usize, seed: u64 },
}

impl Default for PartitionPolicy {
    fn default() -> Self {
        PartitionPolicy::Production
    }
}

impl PartitionPolicy {
    pub fn experimental() -> Self {
        PartitionPolicy::Experimental {
            train_len: 150_000,
            seed: 42,
        }
    }

    pub fn is_experimental(&self) -> bool {
        matches!(self, PartitionPolicy::Experimental { .. })
    }
}

/// Row indices of the test table, as supplied next to it
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TestIndices {
    pub fake: Vec<usize>,
    pub public: Vec<usize>,
    pub private: Vec<usize>,
}

impl TestIndices {
    /// Public rows followed by private rows
    pub fn real(&self) -> Vec<usize> {
        self.public.iter().chain(&self.private).copied().collect()
    }

    /// Checks that the three lists partition `0..nrows`
    pub fn validate(&self, nrows: usize) -> Result<()> {
        let mut seen = vec![false; nrows];
        for (list, indices) in [
            ("fake", &self.fake),
            ("public", &self.public),
            ("private", &self.private),
        ]
        .iter()
        {
            for &i in indices.iter() {
                if i >= nrows {
                    return Err(PipelineError::MalformedInput(format!(
                        "{} index {} is out of range for a test table of {} rows",
                        list, i, nrows
                    )));
                }
                if seen[i] {
                    return Err(PipelineError::MalformedInput(format!(
                        "test row {} is listed twice ({} list)",
                        i, list
                    )));
                }
                seen[i] = true;
            }
        }
        if let Some(missing) = seen.iter().position(|x| !x) {
            return Err(PipelineError::MalformedInput(format!(
                "test row {} is in none of the index lists",
                missing
            )));
        }
        Ok(())
    }
}

/// The three partitions the stages work on
#[derive(Debug, Clone, PartialEq)]
pub struct Partitions {
    pub feature_names: Vec<String>,
    pub train: Array2<f64>,
    pub train_targets: Array1<bool>,
    pub test: Array2<f64>,
    /// Known only in experimental mode
    pub test_targets: Option<Array1<bool>>,
    pub fake: Array2<f64>,
    /// Rows of the test table the test partition came from, production mode only
    pub test_rows: Vec<usize>,
    /// Rows of the test table the fake partition came from, production mode only
    pub fake_rows: Vec<usize>,
}

impl Partitions {
    pub fn n_train(&self) -> usize {
        self.train.nrows()
    }
}

/// Checks that both tables describe the same features and that the training table is labeled
pub fn validate_tables(train: &Table, test: &Table) -> Result<()> {
    if train.targets.is_none() {
        return Err(PipelineError::MalformedInput(
            "training table has no targets".into(),
        ));
    }
    if train.feature_names != test.feature_names {
        return Err(PipelineError::MalformedInput(format!(
            "feature columns differ between train ({} features) and test ({} features)",
            train.nfeatures(),
            test.nfeatures()
        )));
    }
    Ok(())
}

impl PartitionPolicy {
    /// Builds the partitions, consuming both tables
    ///
    /// Production mode needs the index lists of the test table, experimental mode ignores the
    /// test table apart from its header.
    pub fn apply(
        &self,
        train: Table,
        test: Table,
        indices: Option<&TestIndices>,
    ) -> Result<Partitions> {
        validate_tables(&train, &test)?;
        let Table {
            feature_names,
            records,
            targets,
            ..
        } = train;
        let targets = targets.unwrap_or_else(|| Array1::from_elem(0, false));

        let partitions = match *self {
            PartitionPolicy::Production => {
                let indices = indices.ok_or_else(|| {
                    PipelineError::MalformedInput(
                        "production mode needs the fake, public and private index lists".into(),
                    )
                })?;
                indices.validate(test.nsamples())?;
                let test_rows = indices.real();
                Partitions {
                    feature_names,
                    train: records,
                    train_targets: targets,
                    test: test.records.select(Axis(0), &test_rows),
                    test_targets: None,
                    fake: test.records.select(Axis(0), &indices.fake),
                    test_rows,
                    fake_rows: indices.fake.clone(),
                }
            }
            PartitionPolicy::Experimental { train_len, seed } => {
                let n = records.nrows();
                if train_len == 0 || train_len >= n {
                    return Err(PipelineError::MalformedInput(format!(
                        "experimental split after {} rows, but the training table has {} rows",
                        train_len, n
                    )));
                }
                let mut order = (0..n).collect::<Vec<_>>();
                order.shuffle(&mut Xoshiro256Plus::seed_from_u64(seed));
                let (kept, held_out) = order.split_at(train_len);

                let held_out_records = records.select(Axis(0), held_out);
                let held_out_targets = targets.select(Axis(0), held_out);
                Partitions {
                    feature_names,
                    train: records.select(Axis(0), kept),
                    train_targets: targets.select(Axis(0), kept),
                    test: held_out_records.clone(),
                    test_targets: Some(held_out_targets),
                    fake: held_out_records,
                    test_rows: Vec::new(),
                    fake_rows: Vec::new(),
                }
            }
        };

        info!(
            policy = ?self,
            train = partitions.n_train(),
            test = partitions.test.nrows(),
            fake = partitions.fake.nrows(),
            "partitions built"
        );
        Ok(partitions)
    }
}
