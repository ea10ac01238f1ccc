//! Named layout of the fusion network input
//!
//! Every feature contributes a block of [`SLOTS`] adjacent columns: its tree prediction and its
//! raw, count, deviation and density values. The first convolution has a kernel and stride of
//! one block, so each of its outputs sees exactly one feature.

use std::collections::HashSet;

use ndarray::{Array2, ArrayView2};
use tabfuse::{error::Error, Float};

#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

use crate::error::{FusionError, Result};

/// Number of input columns per feature
pub const SLOTS: usize = 5;

/// One kind of per-feature input
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotKind {
    /// Squashed tree prediction
    Prediction,
    /// Standardized feature value
    Raw,
    /// Standardized value count
    Count,
    Deviation,
    Density,
}

/// The order the blocks were concatenated in when the network was designed
pub const DEFAULT_SLOT_ORDER: [SlotKind; SLOTS] = [
    SlotKind::Prediction,
    SlotKind::Raw,
    SlotKind::Count,
    SlotKind::Deviation,
    SlotKind::Density,
];

/// The five (samples × features) matrices that make up the network input
#[derive(Debug, Clone, Copy)]
pub struct FusionInputs<'a, F> {
    pub prediction: ArrayView2<'a, F>,
    pub raw: ArrayView2<'a, F>,
    pub count: ArrayView2<'a, F>,
    pub deviation: ArrayView2<'a, F>,
    pub density: ArrayView2<'a, F>,
}

impl<'a, F> FusionInputs<'a, F> {
    fn get(&self, kind: SlotKind) -> &ArrayView2<'a, F> {
        match kind {
            SlotKind::Prediction => &self.prediction,
            SlotKind::Raw => &self.raw,
            SlotKind::Count => &self.count,
            SlotKind::Deviation => &self.deviation,
            SlotKind::Density => &self.density,
        }
    }
}

/// Feature names and slot order of the network input
///
/// Column `f * SLOTS + s` holds slot `slot_order[s]` of feature `f`.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Debug, Clone, PartialEq)]
pub struct FusionSchema {
    feature_names: Vec<String>,
    slot_order: [SlotKind; SLOTS],
}

impl FusionSchema {
    /// Schema with the default slot order
    ///
    /// Fails on an empty feature list, empty names or duplicate names.
    pub fn new<S: Into<String>>(feature_names: Vec<S>) -> Result<Self> {
        Self::with_slot_order(feature_names, DEFAULT_SLOT_ORDER)
    }

    /// Fails additionally if `slot_order` is not a permutation of the five slot kinds
    pub fn with_slot_order<S: Into<String>>(
        feature_names: Vec<S>,
        slot_order: [SlotKind; SLOTS],
    ) -> Result<Self> {
        let feature_names = feature_names
            .into_iter()
            .map(Into::into)
            .collect::<Vec<String>>();
        if feature_names.is_empty() {
            return Err(FusionError::InvalidSchema("no features".into()));
        }

        let mut seen = HashSet::new();
        for name in &feature_names {
            if name.is_empty() {
                return Err(FusionError::InvalidSchema("empty feature name".into()));
            }
            if !seen.insert(name.as_str()) {
                return Err(FusionError::InvalidSchema(format!(
                    "feature {} appears twice",
                    name
                )));
            }
        }

        let kinds = slot_order.iter().collect::<HashSet<_>>();
        if kinds.len() != SLOTS {
            return Err(FusionError::InvalidSchema(format!(
                "slot order {:?} repeats a slot kind",
                slot_order
            )));
        }

        Ok(FusionSchema {
            feature_names,
            slot_order,
        })
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn slot_order(&self) -> &[SlotKind; SLOTS] {
        &self.slot_order
    }

    pub fn nfeatures(&self) -> usize {
        self.feature_names.len()
    }

    /// Number of input columns
    pub fn width(&self) -> usize {
        self.nfeatures() * SLOTS
    }

    /// Column of slot `kind` of feature `feature`
    pub fn column(&self, feature: &str, kind: SlotKind) -> Option<usize> {
        let f = self.feature_names.iter().position(|name| name == feature)?;
        let s = self.slot_order.iter().position(|k| *k == kind)?;
        Some(f * SLOTS + s)
    }

    /// Interleaves the five input matrices into the network input
    pub fn assemble<F: Float>(&self, inputs: &FusionInputs<F>) -> Result<Array2<f32>> {
        let nsamples = inputs.prediction.nrows();
        for kind in self.slot_order.iter() {
            let matrix = inputs.get(*kind);
            if matrix.nrows() != nsamples {
                return Err(Error::shape_mismatch(
                    format!("{:?} rows", kind),
                    nsamples,
                    matrix.nrows(),
                )
                .into());
            }
            if matrix.ncols() != self.nfeatures() {
                return Err(Error::shape_mismatch(
                    format!("{:?} columns", kind),
                    self.nfeatures(),
                    matrix.ncols(),
                )
                .into());
            }
        }

        let mut assembled = Array2::zeros((nsamples, self.width()));
        for (s, kind) in self.slot_order.iter().enumerate() {
            let matrix = inputs.get(*kind);
            for f in 0..self.nfeatures() {
                assembled
                    .column_mut(f * SLOTS + s)
                    .zip_mut_with(&matrix.column(f), |out, x| {
                        *out = x.to_f32().unwrap_or(f32::NAN)
                    });
            }
        }
        Ok(assembled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    #[test]
    fn rejects_invalid_schemas() {
        assert!(FusionSchema::new(Vec::<String>::new()).is_err());
        assert!(matches!(
            FusionSchema::new(vec!["var_0", "var_1", "var_0"]),
            Err(FusionError::InvalidSchema(_))
        ));
        assert!(FusionSchema::new(vec!["var_0", ""]).is_err());

        let repeated = [
            SlotKind::Prediction,
            SlotKind::Raw,
            SlotKind::Raw,
            SlotKind::Deviation,
            SlotKind::Density,
        ];
        assert!(FusionSchema::with_slot_order(vec!["a"], repeated).is_err());
    }

    #[test]
    fn columns_follow_slot_order() {
        let schema = FusionSchema::new(vec!["a", "b"]).unwrap();
        assert_eq!(schema.width(), 10);
        assert_eq!(schema.column("a", SlotKind::Prediction), Some(0));
        assert_eq!(schema.column("b", SlotKind::Prediction), Some(5));
        assert_eq!(schema.column("b", SlotKind::Density), Some(9));
        assert_eq!(schema.column("c", SlotKind::Raw), None);
    }

    #[test]
    fn assembles_interleaved_blocks() {
        let schema = FusionSchema::new(vec!["a", "b"]).unwrap();
        let prediction = array![[0.1, 0.2], [0.3, 0.4]];
        let raw = array![[1.0, 2.0], [3.0, 4.0]];
        let count = array![[10.0, 20.0], [30.0, 40.0]];
        let deviation = array![[-1.0, -2.0], [-3.0, -4.0]];
        let density = array![[5.0, 6.0], [7.0, 8.0]];
        let inputs = FusionInputs {
            prediction: prediction.view(),
            raw: raw.view(),
            count: count.view(),
            deviation: deviation.view(),
            density: density.view(),
        };

        let x = schema.assemble(&inputs).unwrap();
        assert_eq!(
            x.row(0).to_vec(),
            vec![0.1f32, 1.0, 10.0, -1.0, 5.0, 0.2, 2.0, 20.0, -2.0, 6.0]
        );
        assert_eq!(x[[1, 9]], 8.0);
        assert_eq!(x[[1, schema.column("a", SlotKind::Count).unwrap()]], 30.0);
    }

    #[test]
    fn assemble_validates_shapes() {
        let schema = FusionSchema::new(vec!["a", "b"]).unwrap();
        let good = Array2::<f64>::zeros((3, 2));
        let short = Array2::<f64>::zeros((2, 2));
        let narrow = Array2::<f64>::zeros((3, 1));
        let mut inputs = FusionInputs {
            prediction: good.view(),
            raw: good.view(),
            count: good.view(),
            deviation: good.view(),
            density: short.view(),
        };
        assert!(schema.assemble(&inputs).is_err());
        inputs.density = narrow.view();
        assert!(schema.assemble(&inputs).is_err());
        inputs.density = good.view();
        assert_eq!(schema.assemble(&inputs).unwrap().dim(), (3, 10));
    }
}
