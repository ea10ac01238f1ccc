//! The stages of one pipeline run
//!
//! Every stage takes the frames it transforms by value and hands on only what later stages
//! need. The raw tables are gone after partitioning, the pooled population after the pool has
//! been split back into train and test, and the augmented features once the fusion inputs are
//! assembled.

use std::ops::Range;

use ndarray::{concatenate, s, Array1, Array2, ArrayView2, Axis};
use tracing::info;

use tabfuse::prelude::*;
use tabfuse_density::DensityFeatures;
use tabfuse_fusion::{FusionInputs, FusionPredictions, FusionReport, FusionSchema};
use tabfuse_preprocessing::LinearScaler;
use tabfuse_trees::{EnsembleReport, HyperparameterTable};

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::io::Table;
use crate::partition::{Partitions, TestIndices};
use crate::submission::Submission;

/// Raw values of one partition together with their density features
///
/// After [`standardize`] the raw and count columns are standardized, density and deviation
/// never are.
#[derive(Debug, Clone, PartialEq)]
pub struct AugmentedFeatures {
    pub raw: Array2<f64>,
    pub count: Array2<f64>,
    pub density: Array2<f64>,
    pub deviation: Array2<f64>,
}

impl AugmentedFeatures {
    pub fn new(raw: Array2<f64>, derived: DensityFeatures<f64>) -> Self {
        AugmentedFeatures {
            raw,
            count: derived.count,
            density: derived.density,
            deviation: derived.deviation,
        }
    }

    pub fn nsamples(&self) -> usize {
        self.raw.nrows()
    }

    fn rows(&self, range: Range<usize>) -> Self {
        AugmentedFeatures {
            raw: self.raw.slice(s![range.clone(), ..]).to_owned(),
            count: self.count.slice(s![range.clone(), ..]).to_owned(),
            density: self.density.slice(s![range.clone(), ..]).to_owned(),
            deviation: self.deviation.slice(s![range, ..]).to_owned(),
        }
    }

    /// Fusion inputs with `prediction` as the tree slot
    pub fn fusion_inputs<'a>(&'a self, prediction: ArrayView2<'a, f64>) -> FusionInputs<'a, f64> {
        FusionInputs {
            prediction,
            raw: self.raw.view(),
            count: self.count.view(),
            deviation: self.deviation.view(),
            density: self.density.view(),
        }
    }
}

/// Everything a run needs from outside
#[derive(Debug, Clone)]
pub struct PipelineInputs {
    pub train: Table,
    pub test: Table,
    /// Required in production mode
    pub indices: Option<TestIndices>,
}

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub predictions: FusionPredictions,
    pub ensemble_report: EnsembleReport,
    pub fusion_report: FusionReport,
    /// Production mode only
    pub submission: Option<Submission>,
    /// Experimental mode only
    pub test_auc: Option<f32>,
}

/// Fits the density statistics on the pooled population and derives the features of the pool
/// and of the fake partition
pub fn derive_density(
    config: &PipelineConfig,
    feature_names: &[String],
    pool: Array2<f64>,
    fake: Array2<f64>,
) -> Result<(AugmentedFeatures, AugmentedFeatures)> {
    let population = DatasetBase::from(pool.view()).with_feature_names(feature_names.to_vec());
    let fitted = config.density_params()?.fit(&population)?;

    let pool_derived = fitted.transform(&pool)?;
    let fake_derived = fitted.transform(&fake)?;
    Ok((
        AugmentedFeatures::new(pool, pool_derived),
        AugmentedFeatures::new(fake, fake_derived),
    ))
}

/// Standardizes raw and count columns with statistics of the pool only
pub fn standardize(
    pool: AugmentedFeatures,
    fake: AugmentedFeatures,
) -> Result<(AugmentedFeatures, AugmentedFeatures)> {
    let nfeatures = pool.raw.ncols();
    let joined = |x: &AugmentedFeatures| -> Result<Array2<f64>> {
        Ok(concatenate(Axis(1), &[x.raw.view(), x.count.view()])
            .map_err(tabfuse::error::Error::from)?)
    };

    let pool_joined = joined(&pool)?;
    let scaler = LinearScaler::standard().fit(&DatasetBase::from(pool_joined.view()))?;
    let pool_scaled = scaler.transform(pool_joined)?;
    let fake_scaled = scaler.transform(joined(&fake)?)?;

    let split = |scaled: Array2<f64>, x: AugmentedFeatures| AugmentedFeatures {
        raw: scaled.slice(s![.., ..nfeatures]).to_owned(),
        count: scaled.slice(s![.., nfeatures..]).to_owned(),
        density: x.density,
        deviation: x.deviation,
    };
    info!(columns = 2 * nfeatures, "raw and count columns standardized");
    Ok((split(pool_scaled, pool), split(fake_scaled, fake)))
}

fn to_f64(x: &Array1<f32>) -> Vec<f64> {
    x.iter().map(|p| f64::from(*p)).collect()
}

/// Runs all stages for one configuration
pub struct Driver {
    config: PipelineConfig,
    table: HyperparameterTable,
}

impl Driver {
    pub fn new(config: PipelineConfig, table: HyperparameterTable) -> Self {
        Driver { config, table }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn run(&self, inputs: PipelineInputs) -> Result<PipelineOutput> {
        // parameters are checked before any work is done
        let ensemble_params = self.config.ensemble_params(self.table.clone())?;
        let fusion_params = self.config.fusion_params()?;
        self.config.density_params()?;

        let PipelineInputs {
            train,
            mut test,
            indices,
        } = inputs;
        let test_ids = std::mem::take(&mut test.ids);

        let Partitions {
            feature_names,
            train,
            train_targets,
            test,
            test_targets,
            fake,
            test_rows,
            fake_rows,
        } = self
            .config
            .partition
            .apply(train, test, indices.as_ref())?;
        let n_train = train.nrows();
        let n_test = test.nrows();

        let pool = concatenate(Axis(0), &[train.view(), test.view()])
            .map_err(tabfuse::error::Error::from)?;
        drop((train, test));
        info!(samples = pool.nrows(), "pooled train and real test rows");

        let (pool, fake) = derive_density(&self.config, &feature_names, pool, fake)?;
        let (pool, fake) = standardize(pool, fake)?;
        let train = pool.rows(0..n_train);
        let test = pool.rows(n_train..n_train + n_test);
        drop(pool);

        let test_targets = test_targets.map(|t| t.to_vec());

        // the raw frame moves into the dataset for the tree stage and is taken back afterwards
        let AugmentedFeatures {
            raw,
            count,
            density,
            deviation,
        } = train;
        let dataset = Dataset::new(raw, train_targets).with_feature_names(feature_names.clone());
        let (positives, negatives) = dataset.class_counts();
        info!(positives, negatives, "training targets");
        let (trees, ensemble_report) = ensemble_params.fit_predict(
            &dataset,
            test.raw.view(),
            fake.raw.view(),
            test_targets.as_deref(),
        )?;
        let train_targets = dataset.targets.to_vec();
        let train = AugmentedFeatures {
            raw: dataset.records,
            count,
            density,
            deviation,
        };

        let schema = FusionSchema::new(feature_names)?;
        let x_train = schema.assemble(&train.fusion_inputs(trees.oof.view()))?;
        drop(train);
        let x_test = schema.assemble(&test.fusion_inputs(trees.test.view()))?;
        drop(test);
        let x_fake = schema.assemble(&fake.fusion_inputs(trees.fake.view()))?;
        drop((fake, trees));

        let (predictions, fusion_report) = fusion_params.fit_predict(
            x_train.view(),
            &train_targets,
            x_test.view(),
            x_fake.view(),
            test_targets.as_deref(),
        )?;

        let submission = if self.config.partition.is_experimental() {
            None
        } else {
            Some(Submission::assemble(
                test_ids,
                &test_rows,
                &to_f64(&predictions.test),
                &fake_rows,
                &to_f64(&predictions.fake),
            )?)
        };

        let test_auc = fusion_report.test_auc;
        match test_auc {
            Some(auc) => info!(
                oof_auc = fusion_report.oof_auc,
                test_auc = auc,
                "pipeline finished"
            ),
            None => info!(oof_auc = fusion_report.oof_auc, "pipeline finished"),
        }

        Ok(PipelineOutput {
            predictions,
            ensemble_report,
            fusion_report,
            submission,
            test_auc,
        })
    }
}
