use tabfuse::{
    error::{Error, Result},
    ParamGuard,
};

use crate::gbdt::GbdtParams;
use crate::table::HyperparameterTable;

/// One override of the per-feature booster parameters
///
/// Fields left at `None` keep the value from the hyperparameter table.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Setting {
    pub learning_rate: Option<f64>,
    pub num_leaves: Option<usize>,
    pub max_bin: Option<usize>,
    pub reg_alpha: Option<f64>,
}

impl Setting {
    pub fn apply(&self, mut params: GbdtParams) -> GbdtParams {
        if let Some(learning_rate) = self.learning_rate {
            params = params.learning_rate(learning_rate);
        }
        if let Some(num_leaves) = self.num_leaves {
            params = params.num_leaves(num_leaves);
        }
        if let Some(max_bin) = self.max_bin {
            params = params.max_bin(max_bin);
        }
        if let Some(reg_alpha) = self.reg_alpha {
            params = params.reg_alpha(reg_alpha);
        }
        params
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PerFeatureEnsembleValidParams {
    n_folds: usize,
    seed: u64,
    settings: Vec<Setting>,
    base: GbdtParams,
    squash_offset: f64,
    table: HyperparameterTable,
}

impl PerFeatureEnsembleValidParams {
    pub fn n_folds(&self) -> usize {
        self.n_folds
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn settings(&self) -> &[Setting] {
        &self.settings
    }

    pub fn base(&self) -> &GbdtParams {
        &self.base
    }

    pub fn squash_offset(&self) -> f64 {
        self.squash_offset
    }

    pub fn table(&self) -> &HyperparameterTable {
        &self.table
    }
}

/// Parameters of the per-feature boosted ensemble
///
/// Every feature gets its own univariate booster per fold, trained with the parameters the
/// [table](HyperparameterTable) lists for the feature's name on top of `base`. Every setting is
/// evaluated and the one with the lowest out-of-fold log-loss is kept.
#[derive(Debug, Clone, PartialEq)]
pub struct PerFeatureEnsembleParams(PerFeatureEnsembleValidParams);

/// Marker type to create per-feature ensemble parameters
pub struct PerFeatureEnsemble;

impl PerFeatureEnsemble {
    /// Defaults:
    /// * `n_folds = 5`
    /// * `seed = 47`
    /// * `settings = [Setting::default()]`
    /// * `base = GbdtParams::new()`
    /// * `squash_offset = 0.1`
    /// * `table = HyperparameterTable::default()` (empty, every feature uses `base`)
    pub fn params() -> PerFeatureEnsembleParams {
        PerFeatureEnsembleParams(PerFeatureEnsembleValidParams {
            n_folds: 5,
            seed: 47,
            settings: vec![Setting::default()],
            base: GbdtParams::new(),
            squash_offset: 0.1,
            table: HyperparameterTable::default(),
        })
    }
}

impl PerFeatureEnsembleParams {
    /// Sets the number of stratified folds per feature
    pub fn n_folds(mut self, n_folds: usize) -> Self {
        self.0.n_folds = n_folds;
        self
    }

    /// Seeds the generator that draws one fold seed per feature
    pub fn seed(mut self, seed: u64) -> Self {
        self.0.seed = seed;
        self
    }

    pub fn settings(mut self, settings: Vec<Setting>) -> Self {
        self.0.settings = settings;
        self
    }

    /// Sets the booster parameters shared by all features
    pub fn base(mut self, base: GbdtParams) -> Self {
        self.0.base = base;
        self
    }

    /// Sets `c` in the squashing `sqrt(p - mean(p) + c)`
    pub fn squash_offset(mut self, squash_offset: f64) -> Self {
        self.0.squash_offset = squash_offset;
        self
    }

    pub fn table(mut self, table: HyperparameterTable) -> Self {
        self.0.table = table;
        self
    }
}

impl ParamGuard for PerFeatureEnsembleParams {
    type Checked = PerFeatureEnsembleValidParams;
    type Error = Error;

    fn check_ref(&self) -> Result<&Self::Checked> {
        let p = &self.0;
        if p.n_folds < 2 {
            Err(Error::Parameters(format!(
                "Number of folds should be at least two, but was {}",
                p.n_folds
            )))
        } else if p.settings.is_empty() {
            Err(Error::Parameters(
                "At least one setting has to be evaluated".into(),
            ))
        } else if !(p.squash_offset >= 0.0) || !p.squash_offset.is_finite() {
            Err(Error::Parameters(format!(
                "Squash offset should be non-negative, but was {}",
                p.squash_offset
            )))
        } else {
            p.base.check_ref()?;
            Ok(&self.0)
        }
    }

    fn check(self) -> Result<Self::Checked> {
        self.check_ref()?;
        Ok(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let params = PerFeatureEnsemble::params().check().unwrap();
        assert_eq!(params.n_folds(), 5);
        assert_eq!(params.seed(), 47);
        assert_eq!(params.settings().len(), 1);
    }

    #[test]
    fn rejects_invalid() {
        assert!(PerFeatureEnsemble::params().n_folds(1).check().is_err());
        assert!(PerFeatureEnsemble::params().settings(vec![]).check().is_err());
        assert!(PerFeatureEnsemble::params().squash_offset(-0.1).check().is_err());
        assert!(PerFeatureEnsemble::params()
            .base(GbdtParams::new().num_leaves(1))
            .check()
            .is_err());
    }

    #[test]
    fn setting_overrides_only_given_fields() {
        let setting = Setting {
            num_leaves: Some(8),
            ..Setting::default()
        };
        let params = setting.apply(GbdtParams::new().learning_rate(0.3)).check().unwrap();
        assert_eq!(params.num_leaves(), 8);
        assert!((params.learning_rate() - 0.3).abs() < 1e-12);
    }
}
