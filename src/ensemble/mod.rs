//! Blending of base-model predictions.
//!
//! Labels are encoded bullish 1, neutral 0, bearish -1; the blended score
//! is thresholded at ±0.33 to recover a label.

pub mod optimizer;

pub use optimizer::{
    predictions_from_labels, EnsembleConfig, EnsembleWeightOptimizer, EnsembleWeights,
    WeightSource,
};
