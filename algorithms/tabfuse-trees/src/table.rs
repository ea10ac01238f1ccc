//! Per-feature booster hyperparameters
//!
//! The values were tuned offline once per feature and are only looked up at runtime. The
//! table is keyed by feature name, so reordering the input columns does not change which
//! parameters a feature is trained with.

use std::collections::BTreeMap;
use std::path::Path;

use serde_crate::{Deserialize, Serialize};

use crate::error::{Result, TreesError};
use crate::gbdt::GbdtParams;

const SHIPPED_TABLE: &str = include_str!("../data/hyperparams.json");

/// Booster parameters that vary between features
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(crate = "serde_crate")]
pub struct FeatureHyperparams {
    pub max_bin: usize,
    pub learning_rate: f64,
    /// L1 penalty on leaf values
    pub reg_alpha: f64,
    pub num_leaves: usize,
}

impl FeatureHyperparams {
    /// Overrides the per-feature fields of `base`
    pub fn apply(&self, base: GbdtParams) -> GbdtParams {
        base.max_bin(self.max_bin)
            .learning_rate(self.learning_rate)
            .reg_alpha(self.reg_alpha)
            .num_leaves(self.num_leaves)
    }
}

/// Mapping from feature name to its booster parameters
///
/// ```rust
/// use tabfuse_trees::HyperparameterTable;
///
/// let table = HyperparameterTable::shipped().unwrap();
/// let var_0 = table.get("var_0").unwrap();
/// assert_eq!(var_0.num_leaves, 4);
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(crate = "serde_crate")]
pub struct HyperparameterTable {
    /// Used for features without an entry of their own
    #[serde(default)]
    pub default: Option<FeatureHyperparams>,
    #[serde(default)]
    pub features: BTreeMap<String, FeatureHyperparams>,
}

impl HyperparameterTable {
    /// The table tuned for the 200 `var_*` features, compiled into the crate
    pub fn shipped() -> Result<Self> {
        Self::from_json(SHIPPED_TABLE)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Parameters of `feature`, falling back to the default entry
    pub fn get(&self, feature: &str) -> Result<FeatureHyperparams> {
        self.features
            .get(feature)
            .or_else(|| self.default.as_ref())
            .copied()
            .ok_or_else(|| TreesError::MissingFeature(feature.to_string()))
    }

    /// `base` with the parameters of `feature` applied
    ///
    /// A table without entries and without default leaves `base` unchanged, otherwise a feature
    /// that resolves to nothing is an error.
    pub fn resolve(&self, feature: &str, base: GbdtParams) -> Result<GbdtParams> {
        if self.features.is_empty() && self.default.is_none() {
            return Ok(base);
        }
        Ok(self.get(feature)?.apply(base))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabfuse::ParamGuard;

    #[test]
    fn shipped_table_covers_all_features() {
        let table = HyperparameterTable::shipped().unwrap();
        assert_eq!(table.len(), 200);
        for i in 0..200 {
            assert!(table.features.contains_key(&format!("var_{}", i)));
        }

        let var_0 = table.get("var_0").unwrap();
        assert_eq!(var_0.max_bin, 256);
        assert_eq!(var_0.num_leaves, 4);
        assert!((var_0.learning_rate - 0.12).abs() < 1e-12);
        assert!((var_0.reg_alpha - 3.0).abs() < 1e-12);

        // every shipped entry must pass the booster's parameter checks
        for params in table.features.values() {
            assert!(params.apply(GbdtParams::new()).check().is_ok());
        }
    }

    #[test]
    fn falls_back_to_default() {
        let table = HyperparameterTable::shipped().unwrap();
        let unknown = table.get("not_a_feature").unwrap();
        assert_eq!(Some(unknown), table.default);

        let without_default = HyperparameterTable::from_json(
            r#"{"features": {"a": {"max_bin": 16, "learning_rate": 0.1, "reg_alpha": 0.0, "num_leaves": 2}}}"#,
        )
        .unwrap();
        assert_eq!(without_default.get("a").unwrap().max_bin, 16);
        assert!(matches!(
            without_default.get("b"),
            Err(TreesError::MissingFeature(name)) if name == "b"
        ));
    }

    #[test]
    fn empty_table_keeps_base() {
        let base = GbdtParams::new().learning_rate(0.3);
        let empty = HyperparameterTable::default();
        assert_eq!(empty.resolve("anything", base).unwrap(), base);

        let shipped = HyperparameterTable::shipped().unwrap();
        let resolved = shipped.resolve("var_0", base).unwrap().check().unwrap();
        assert_eq!(resolved.learning_rate(), 0.12);
        assert_eq!(resolved.num_leaves(), 4);
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(matches!(
            HyperparameterTable::from_json("{\"features\": 3}"),
            Err(TreesError::Json(_))
        ));
    }
}
