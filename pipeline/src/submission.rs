//! Assembly of the submission from real and fake predictions

use crate::error::{PipelineError, Result};

/// One prediction per row of the test table
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub ids: Vec<String>,
    pub targets: Vec<f64>,
}

impl Submission {
    /// Scatters real and fake predictions back to their rows of the test table
    ///
    /// `real[i]` belongs to row `real_rows[i]`, `fake[i]` to row `fake_rows[i]`. Every row of
    /// `ids` has to receive exactly one prediction.
    pub fn assemble(
        ids: Vec<String>,
        real_rows: &[usize],
        real: &[f64],
        fake_rows: &[usize],
        fake: &[f64],
    ) -> Result<Self> {
        tabfuse::error::ensure_len("real predictions", real_rows.len(), real.len())?;
        tabfuse::error::ensure_len("fake predictions", fake_rows.len(), fake.len())?;

        let mut targets = vec![None; ids.len()];
        for (&row, &p) in real_rows.iter().zip(real).chain(fake_rows.iter().zip(fake)) {
            let n = ids.len();
            let slot = targets.get_mut(row).ok_or_else(|| {
                PipelineError::MalformedInput(format!(
                    "prediction for row {} outside a test table of {} rows",
                    row, n
                ))
            })?;
            if slot.is_some() {
                return Err(PipelineError::MalformedInput(format!(
                    "test row {} receives two predictions",
                    row
                )));
            }
            *slot = Some(p);
        }

        let targets = targets
            .into_iter()
            .enumerate()
            .map(|(row, p)| {
                p.ok_or_else(|| {
                    PipelineError::MalformedInput(format!("test row {} has no prediction", row))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Submission { ids, targets })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
