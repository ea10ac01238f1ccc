//! JSON configuration of a pipeline run
//!
//! Every field has a default, so `{}` is a complete configuration. Stage parameters are turned
//! into the checked parameter types of the algorithm crates before anything is loaded.

use std::fs;
use std::path::Path;

use serde_crate::{Deserialize, Serialize};
use tabfuse::ParamGuard;
use tabfuse_density::{Density, DensityValidParams};
use tabfuse_fusion::{FusionTrainer, FusionTrainerValidParams, PoolLayout};
use tabfuse_trees::{
    GradientBoostedTrees, HyperparameterTable, PerFeatureEnsemble, PerFeatureEnsembleValidParams,
};

use crate::error::Result;
use crate::partition::PartitionPolicy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(crate = "serde_crate", default, deny_unknown_fields)]
pub struct DensityConfig {
    pub precision: u32,
    pub sigma_base: f64,
    pub sigma_scale: f64,
    pub eps: f64,
}

impl Default for DensityConfig {
    fn default() -> Self {
        DensityConfig {
            precision: 4,
            sigma_base: 4.0,
            sigma_scale: 0.001,
            eps: 1e-8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(crate = "serde_crate", default, deny_unknown_fields)]
pub struct TreesConfig {
    pub n_folds: usize,
    pub seed: u64,
    pub num_threads: usize,
    pub num_boost_round: usize,
    pub early_stopping_rounds: Option<usize>,
    pub squash_offset: f64,
}

impl Default for TreesConfig {
    fn default() -> Self {
        TreesConfig {
            n_folds: 5,
            seed: 47,
            num_threads: 8,
            num_boost_round: 2000,
            early_stopping_rounds: Some(10),
            squash_offset: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(crate = "serde_crate", default, deny_unknown_fields)]
pub struct FusionConfig {
    pub n_folds: usize,
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f32,
    pub late_learning_rate: f32,
    pub decay: f32,
    pub seed: u64,
    pub stratified: bool,
    pub layout: PoolLayout,
    pub restore_best_weights: bool,
}

impl Default for FusionConfig {
    fn default() -> Self {
        FusionConfig {
            n_folds: 7,
            epochs: 60,
            batch_size: 4000,
            learning_rate: 0.02,
            late_learning_rate: 0.002,
            decay: 1e-5,
            seed: 42,
            stratified: false,
            layout: PoolLayout::AcrossFeatures,
            restore_best_weights: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(crate = "serde_crate", default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub partition: PartitionPolicy,
    pub density: DensityConfig,
    pub trees: TreesConfig,
    pub fusion: FusionConfig,
}

impl PipelineConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_json(&fs::read_to_string(path)?)
    }

    pub fn density_params(&self) -> Result<DensityValidParams> {
        let c = &self.density;
        Ok(Density::params()
            .precision(c.precision)
            .sigma_base(c.sigma_base)
            .sigma_scale(c.sigma_scale)
            .eps(c.eps)
            .check()?)
    }

    /// Ensemble parameters resolving per-feature values from `table`
    pub fn ensemble_params(&self, table: HyperparameterTable) -> Result<PerFeatureEnsembleValidParams> {
        let c = &self.trees;
        let base = GradientBoostedTrees::<f64>::params()
            .num_threads(c.num_threads)
            .num_boost_round(c.num_boost_round)
            .early_stopping_rounds(c.early_stopping_rounds);
        Ok(PerFeatureEnsemble::params()
            .n_folds(c.n_folds)
            .seed(c.seed)
            .squash_offset(c.squash_offset)
            .base(base)
            .table(table)
            .check()?)
    }

    pub fn fusion_params(&self) -> Result<FusionTrainerValidParams> {
        let c = &self.fusion;
        Ok(FusionTrainer::params()
            .n_folds(c.n_folds)
            .epochs(c.epochs)
            .batch_size(c.batch_size)
            .learning_rates(c.learning_rate, c.late_learning_rate)
            .decay(c.decay)
            .seed(c.seed)
            .stratified(c.stratified)
            .layout(c.layout)
            .restore_best_weights(c.restore_best_weights)
            .check()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = PipelineConfig::from_json("{}").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.partition, PartitionPolicy::Production);

        let fusion = config.fusion_params().unwrap();
        assert_eq!(fusion.n_folds(), 7);
        assert_eq!(fusion.epochs(), 60);
        let trees = config.ensemble_params(HyperparameterTable::default()).unwrap();
        assert_eq!(trees.n_folds(), 5);
        assert_eq!(trees.seed(), 47);
        assert_eq!(config.density_params().unwrap().precision(), 4);
    }

    #[test]
    fn partial_config_overrides_fields() {
        let json = r#"{
            "partition": {"experimental": {"train_len": 1000, "seed": 3}},
            "trees": {"n_folds": 3},
            "fusion": {"layout": "WithinFeature", "epochs": 5}
        }"#;
        let config = PipelineConfig::from_json(json).unwrap();
        assert_eq!(
            config.partition,
            PartitionPolicy::Experimental {
                train_len: 1000,
                seed: 3
            }
        );
        assert_eq!(config.trees.n_folds, 3);
        assert_eq!(config.trees.seed, 47);
        assert_eq!(config.fusion.layout, PoolLayout::WithinFeature);
        assert_eq!(config.fusion_params().unwrap().epochs(), 5);
    }

    #[test]
    fn rejects_unknown_and_invalid_values() {
        assert!(PipelineConfig::from_json(r#"{"trees": {"folds": 3}}"#).is_err());
        let config = PipelineConfig::from_json(r#"{"fusion": {"n_folds": 1}}"#).unwrap();
        assert!(config.fusion_params().is_err());
        let config = PipelineConfig::from_json(r#"{"density": {"eps": 0.0}}"#).unwrap();
        assert!(config.density_params().is_err());
    }
}
