//! The convolutional ensembler
//!
//! ```text
//! (batch, 1, F·5) → conv(k=5, stride=5, 32) → ELU → BN
//!                 → 1×1 conv 24 → ELU → BN → 1×1 conv 16 → ELU → BN
//!                 → 1×1 conv 4 → ELU
//!                 → flatten (F·4) → average pool of adjacent pairs → BN → dense(1)
//! ```
//!
//! Up to the pooling layer every feature is processed on its own with shared weights. The
//! pooling is the only place where two features can meet before the final dense unit.

use std::collections::HashMap;
use std::sync::MutexGuard;

use candle_core::{DType, Device, Tensor, Var, D};
use candle_nn::{
    BatchNorm, BatchNormConfig, Conv1d, Conv1dConfig, Linear, Module, ModuleT, VarBuilder, VarMap,
};
use ndarray::{s, Array1, ArrayView2, Axis};
use rand::Rng;
use tabfuse::error::Error;

#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

use crate::error::{FusionError, Result};
use crate::optimizer::Adam;
use crate::schema::SLOTS;

/// Output channels of the four per-feature convolutions
pub const CHANNELS: [usize; 4] = [32, 24, 16, 4];

/// Normalization with moving averages decaying by 0.99 per training batch
const BN_CONFIG: BatchNormConfig = BatchNormConfig {
    eps: 1e-3,
    remove_mean: true,
    affine: true,
    momentum: 0.01,
};
const PROBA_CLIP: f32 = 1e-7;

/// How the per-feature outputs are flattened before pairwise pooling
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolLayout {
    /// Channel-major: each pair holds the same channel of two neighbouring features. Needs an
    /// even number of features, otherwise the last feature of one channel would be paired with
    /// the first feature of the next.
    AcrossFeatures,
    /// Feature-major: each pair holds two channels of the same feature
    WithinFeature,
}

impl Default for PoolLayout {
    fn default() -> Self {
        PoolLayout::AcrossFeatures
    }
}

/// Mean binary cross-entropy of `proba` against `targets`
pub fn binary_cross_entropy(proba: &Array1<f32>, targets: &[bool]) -> f32 {
    let total = proba
        .iter()
        .zip(targets)
        .map(|(p, y)| {
            let p = p.max(PROBA_CLIP).min(1.0 - PROBA_CLIP);
            if *y {
                -p.ln()
            } else {
                -(1.0 - p).ln()
            }
        })
        .sum::<f32>();
    total / proba.len().max(1) as f32
}

/// Fraction of samples with `(p > 0.5) == target`
pub fn accuracy(proba: &Array1<f32>, targets: &[bool]) -> f32 {
    let hits = proba
        .iter()
        .zip(targets)
        .filter(|(p, y)| (**p > 0.5) == **y)
        .count();
    hits as f32 / proba.len().max(1) as f32
}

fn is_moving_statistic(name: &str) -> bool {
    name.ends_with("running_mean") || name.ends_with("running_var")
}

/// Values of every variable, moving statistics included
#[derive(Debug, Clone)]
pub struct Checkpoint(Vec<(String, Tensor)>);

pub struct FusionNetwork {
    nfeatures: usize,
    layout: PoolLayout,
    device: Device,
    varmap: VarMap,
    convs: Vec<Conv1d>,
    norms: Vec<BatchNorm>,
    pool_norm: BatchNorm,
    dense: Linear,
}

impl FusionNetwork {
    /// A freshly initialized network for `nfeatures` feature blocks
    ///
    /// Convolution and dense weights are drawn Glorot-uniform from `rng`, biases start at zero.
    pub fn new<R: Rng>(nfeatures: usize, layout: PoolLayout, rng: &mut R) -> Result<Self> {
        if nfeatures == 0 {
            return Err(Error::MalformedInput("fusion network without features".into()).into());
        }
        if layout == PoolLayout::AcrossFeatures && nfeatures % 2 == 1 {
            return Err(Error::Parameters(format!(
                "pooling across features needs an even number of features, but got {}",
                nfeatures
            ))
            .into());
        }

        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);

        let mut convs = Vec::with_capacity(CHANNELS.len());
        let (mut in_channels, mut kernel) = (1, SLOTS);
        for (i, &out_channels) in CHANNELS.iter().enumerate() {
            let config = Conv1dConfig {
                stride: kernel,
                ..Default::default()
            };
            convs.push(candle_nn::conv1d(
                in_channels,
                out_channels,
                kernel,
                config,
                vb.pp(format!("conv{}", i)),
            )?);
            in_channels = out_channels;
            kernel = 1;
        }
        let norms = CHANNELS[..CHANNELS.len() - 1]
            .iter()
            .enumerate()
            .map(|(i, &channels)| {
                candle_nn::batch_norm(channels, BN_CONFIG, vb.pp(format!("norm{}", i)))
            })
            .collect::<candle_core::Result<Vec<_>>>()?;
        let pooled = Self::pooled_width(nfeatures);
        let pool_norm = candle_nn::batch_norm(pooled, BN_CONFIG, vb.pp("pool_norm"))?;
        let dense = candle_nn::linear(pooled, 1, vb.pp("dense"))?;

        let network = FusionNetwork {
            nfeatures,
            layout,
            device,
            varmap,
            convs,
            norms,
            pool_norm,
            dense,
        };
        network.initialize(rng)?;
        Ok(network)
    }

    fn pooled_width(nfeatures: usize) -> usize {
        nfeatures * CHANNELS[CHANNELS.len() - 1] / 2
    }

    fn variables(&self) -> Result<MutexGuard<'_, HashMap<String, Var>>> {
        self.varmap.data().lock().map_err(|_| {
            FusionError::Candle(candle_core::Error::Msg("poisoned variable map".into()))
        })
    }

    fn initialize<R: Rng>(&self, rng: &mut R) -> Result<()> {
        let vars = self.variables()?;
        let mut trainable = vars
            .iter()
            .filter(|(name, _)| name.starts_with("conv") || name.starts_with("dense"))
            .collect::<Vec<_>>();
        trainable.sort_by(|a, b| a.0.cmp(b.0));

        for (name, var) in trainable {
            let dims = var.dims().to_vec();
            let values = if name.ends_with("bias") {
                vec![0.0f32; var.elem_count()]
            } else {
                let receptive = dims[2..].iter().product::<usize>();
                let limit = (6.0 / ((dims[0] + dims[1]) * receptive) as f32).sqrt();
                (0..var.elem_count())
                    .map(|_| rng.gen_range(-limit..limit))
                    .collect()
            };
            var.set(&Tensor::from_vec(values, dims, &self.device)?)?;
        }
        Ok(())
    }

    pub fn nfeatures(&self) -> usize {
        self.nfeatures
    }

    pub fn layout(&self) -> PoolLayout {
        self.layout
    }

    /// Number of trainable weights (moving statistics excluded)
    pub fn parameter_count(&self) -> Result<usize> {
        Ok(self
            .variables()?
            .iter()
            .filter(|(name, _)| !is_moving_statistic(name))
            .map(|(_, var)| var.elem_count())
            .sum())
    }

    /// Variables for the optimizer, moving statistics never receive a gradient
    pub fn trainable_vars(&self) -> Vec<Var> {
        self.varmap.all_vars()
    }

    pub fn checkpoint(&self) -> Result<Checkpoint> {
        let values = self
            .variables()?
            .iter()
            .map(|(name, var)| Ok((name.clone(), var.as_tensor().copy()?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Checkpoint(values))
    }

    pub fn restore(&self, checkpoint: &Checkpoint) -> Result<()> {
        let vars = self.variables()?;
        for (name, value) in &checkpoint.0 {
            if let Some(var) = vars.get(name) {
                var.set(value)?;
            }
        }
        Ok(())
    }

    fn input(&self, x: ArrayView2<f32>) -> Result<Tensor> {
        if x.ncols() != self.nfeatures * SLOTS {
            return Err(
                Error::shape_mismatch("fusion input columns", self.nfeatures * SLOTS, x.ncols())
                    .into(),
            );
        }
        Ok(Tensor::from_iter(x.iter().copied(), &self.device)?.reshape((x.nrows(), 1, x.ncols()))?)
    }

    /// Flattens `(batch, channels, features)` per layout and averages adjacent pairs
    fn pool(&self, h: &Tensor) -> candle_core::Result<Tensor> {
        let batch = h.dim(0)?;
        let flat = match self.layout {
            PoolLayout::AcrossFeatures => h.flatten_from(1)?,
            PoolLayout::WithinFeature => h.transpose(1, 2)?.contiguous()?.flatten_from(1)?,
        };
        let width = flat.dim(1)?;
        flat.reshape((batch, width / 2, 2))?.mean(D::Minus1)
    }

    /// Logits of the positive class, batch statistics are used and updated when `training`
    fn logits(&self, x: &Tensor, training: bool) -> candle_core::Result<Tensor> {
        let mut h = x.clone();
        for (i, conv) in self.convs.iter().enumerate() {
            h = conv.forward(&h)?.elu(1.0)?;
            if let Some(norm) = self.norms.get(i) {
                h = norm.forward_t(&h, training)?;
            }
        }
        let z = self.pool_norm.forward_t(&self.pool(&h)?, training)?;
        self.dense.forward(&z)?.squeeze(1)
    }

    /// Probabilities of the positive class for a batch in inference mode
    pub fn forward(&self, x: ArrayView2<f32>) -> Result<Array1<f32>> {
        let logits = self.logits(&self.input(x)?, false)?;
        Ok(Array1::from(candle_nn::ops::sigmoid(&logits)?.to_vec1::<f32>()?))
    }

    /// One optimization step on a batch, returns the loss and accuracy of the batch before
    /// the update
    pub fn train_batch(
        &self,
        x: ArrayView2<f32>,
        targets: &[bool],
        optimizer: &mut Adam,
    ) -> Result<(f32, f32)> {
        tabfuse::error::ensure_len("batch targets", x.nrows(), targets.len())?;
        let inputs = self.input(x)?;
        let labels = Tensor::from_iter(
            targets.iter().map(|&y| if y { 1.0f32 } else { 0.0 }),
            &self.device,
        )?;

        let logits = self.logits(&inputs, true)?;
        let loss = candle_nn::loss::binary_cross_entropy_with_logit(&logits, &labels)?;
        optimizer.backward_step(&loss)?;

        let proba = Array1::from(candle_nn::ops::sigmoid(&logits)?.to_vec1::<f32>()?);
        Ok((loss.to_scalar::<f32>()?, accuracy(&proba, targets)))
    }

    /// Inference in chunks of `batch_size` rows
    pub fn predict(&self, x: ArrayView2<f32>, batch_size: usize) -> Result<Array1<f32>> {
        let mut out = Array1::zeros(x.nrows());
        let batch_size = batch_size.max(1);
        for (i, chunk) in x.axis_chunks_iter(Axis(0), batch_size).enumerate() {
            let start = i * batch_size;
            let proba = self.forward(chunk)?;
            out.slice_mut(s![start..start + chunk.nrows()]).assign(&proba);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::Array2;
    use ndarray_rand::{rand_distr::Uniform, RandomExt};
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256Plus;

    #[test]
    fn parameter_count_is_tiny() {
        let mut rng = Xoshiro256Plus::seed_from_u64(0);
        let network = FusionNetwork::new(200, PoolLayout::AcrossFeatures, &mut rng).unwrap();
        assert_eq!(network.parameter_count().unwrap(), 2797);

        let network = FusionNetwork::new(10, PoolLayout::WithinFeature, &mut rng).unwrap();
        assert_eq!(network.parameter_count().unwrap(), 1597 + 6 * 10);
    }

    #[test]
    fn constant_input_gives_equal_finite_outputs() {
        let mut rng = Xoshiro256Plus::seed_from_u64(1);
        let network = FusionNetwork::new(3, PoolLayout::WithinFeature, &mut rng).unwrap();
        let mut adam = Adam::new(network.trainable_vars(), 0.02, 1e-5).unwrap();
        let x = Array2::zeros((10, 15));
        let targets = (0..10).map(|i| i % 2 == 0).collect::<Vec<_>>();

        let (loss, _) = network.train_batch(x.view(), &targets, &mut adam).unwrap();
        assert!(loss.is_finite());

        let proba = network.predict(x.view(), 4).unwrap();
        assert_eq!(proba.len(), 10);
        assert!(proba.iter().all(|p| p.is_finite()));
        for p in proba.iter() {
            assert_abs_diff_eq!(*p, proba[0], epsilon = 1e-6);
        }
    }

    #[test]
    fn pooling_layouts_pair_different_units() {
        let mut rng = Xoshiro256Plus::seed_from_u64(2);
        let across = FusionNetwork::new(2, PoolLayout::AcrossFeatures, &mut rng).unwrap();
        let within = FusionNetwork::new(2, PoolLayout::WithinFeature, &mut rng).unwrap();

        // one sample, feature 0 has channels [0, 1, 2, 3], feature 1 has [10, 11, 12, 13]
        let values = (0..4)
            .flat_map(|c| (0..2).map(move |f| (10 * f + c) as f32))
            .collect::<Vec<_>>();
        let h = Tensor::from_vec(values, (1, 4, 2), &Device::Cpu).unwrap();

        let pooled = |n: &FusionNetwork| {
            n.pool(&h)
                .and_then(|p| p.squeeze(0))
                .and_then(|p| p.to_vec1::<f32>())
                .unwrap()
        };
        assert_eq!(pooled(&across), vec![5.0, 6.0, 7.0, 8.0]);
        assert_eq!(pooled(&within), vec![0.5, 2.5, 10.5, 12.5]);
    }

    #[test]
    fn odd_feature_count_needs_within_feature_pooling() {
        let mut rng = Xoshiro256Plus::seed_from_u64(5);
        assert!(FusionNetwork::new(3, PoolLayout::AcrossFeatures, &mut rng).is_err());
        assert!(FusionNetwork::new(3, PoolLayout::WithinFeature, &mut rng).is_ok());
        assert!(FusionNetwork::new(0, PoolLayout::WithinFeature, &mut rng).is_err());
    }

    #[test]
    fn training_reduces_loss() {
        let mut rng = Xoshiro256Plus::seed_from_u64(3);
        let network = FusionNetwork::new(4, PoolLayout::AcrossFeatures, &mut rng).unwrap();
        let mut adam = Adam::new(network.trainable_vars(), 0.02, 1e-5).unwrap();

        let x = Array2::random_using((256, 20), Uniform::new(-1.0f32, 1.0), &mut rng);
        // the label is the sign of the first prediction slot
        let targets = x.column(0).iter().map(|v| *v > 0.0).collect::<Vec<_>>();

        let before = binary_cross_entropy(&network.predict(x.view(), 64).unwrap(), &targets);
        for _ in 0..400 {
            network.train_batch(x.view(), &targets, &mut adam).unwrap();
        }
        let proba = network.predict(x.view(), 64).unwrap();
        let after = binary_cross_entropy(&proba, &targets);
        assert!(after < before, "loss went from {} to {}", before, after);
        assert!(accuracy(&proba, &targets) > 0.8);
    }

    #[test]
    fn restore_brings_back_checkpointed_weights() {
        let mut rng = Xoshiro256Plus::seed_from_u64(6);
        let network = FusionNetwork::new(2, PoolLayout::AcrossFeatures, &mut rng).unwrap();
        let mut adam = Adam::new(network.trainable_vars(), 0.05, 0.0).unwrap();
        let x = Array2::random_using((32, 10), Uniform::new(-1.0f32, 1.0), &mut rng);
        let targets = x.column(0).iter().map(|v| *v > 0.0).collect::<Vec<_>>();

        let saved = network.checkpoint().unwrap();
        let before = network.predict(x.view(), 32).unwrap();
        for _ in 0..5 {
            network.train_batch(x.view(), &targets, &mut adam).unwrap();
        }
        assert_ne!(network.predict(x.view(), 32).unwrap(), before);

        network.restore(&saved).unwrap();
        assert_eq!(network.predict(x.view(), 32).unwrap(), before);
    }

    #[test]
    fn rejects_wrong_width() {
        let mut rng = Xoshiro256Plus::seed_from_u64(4);
        let network = FusionNetwork::new(2, PoolLayout::AcrossFeatures, &mut rng).unwrap();
        assert!(network.forward(Array2::zeros((3, 11)).view()).is_err());
    }
}
