mod accumulator;
mod algorithm;
mod hyperparams;

pub use accumulator::{
    squash, FeatureAccumulator, FeatureColumns, FoldPredictions, PredictionMatrix,
};
pub use algorithm::{EnsemblePredictions, EnsembleReport, FeatureReport};
pub use hyperparams::{
    PerFeatureEnsemble, PerFeatureEnsembleParams, PerFeatureEnsembleValidParams, Setting,
};
