//! Ensemble weight optimizer.
//!
//! Fits non-negative blend weights over base models by ridge regression of
//! the encoded realized label on the models' encoded predictions (no
//! intercept). Negative coefficients are clipped, survivors renormalized,
//! and a degenerate fit falls back to uniform weights.

use std::collections::BTreeMap;

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::data::{Label, ModelPrediction};
use crate::error::{CoreError, CoreResult};

/// Ensemble configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleConfig {
    /// L2 penalty.
    pub ridge_alpha: f64,
    /// Scores within ±band map to neutral.
    pub neutral_band: f64,
    /// Allowed deviation of the weight sum from 1.
    pub weight_sum_tolerance: f64,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            ridge_alpha: 1.0,
            neutral_band: 0.33,
            weight_sum_tolerance: 0.01,
        }
    }
}

/// How the current weights were obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WeightSource {
    Ridge,
    UniformFallback,
}

/// Model name to weight; non-negative, summing to 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleWeights {
    weights: BTreeMap<String, f64>,
    source: WeightSource,
}

impl EnsembleWeights {
    fn uniform<'a>(names: impl IntoIterator<Item = &'a String>) -> Self {
        let names: Vec<&String> = names.into_iter().collect();
        let w = 1.0 / names.len().max(1) as f64;
        Self {
            weights: names.into_iter().map(|n| (n.clone(), w)).collect(),
            source: WeightSource::UniformFallback,
        }
    }

    pub fn get(&self, model: &str) -> Option<f64> {
        self.weights.get(model).copied()
    }

    pub fn as_map(&self) -> &BTreeMap<String, f64> {
        &self.weights
    }

    pub fn source(&self) -> WeightSource {
        self.source
    }

    pub fn sum(&self) -> f64 {
        self.weights.values().sum()
    }
}

/// Encode every model's labels as predictions.
pub fn predictions_from_labels(
    labels: &BTreeMap<String, Vec<Label>>,
) -> BTreeMap<String, Vec<ModelPrediction>> {
    labels
        .iter()
        .map(|(name, ls)| (name.clone(), ls.iter().copied().map(ModelPrediction::from).collect()))
        .collect()
}

/// Learns and applies blend weights.
#[derive(Debug, Clone, Default)]
pub struct EnsembleWeightOptimizer {
    config: EnsembleConfig,
    weights: Option<EnsembleWeights>,
}

impl EnsembleWeightOptimizer {
    pub fn new(config: EnsembleConfig) -> Self {
        Self {
            config,
            weights: None,
        }
    }

    pub fn config(&self) -> &EnsembleConfig {
        &self.config
    }

    /// Fitted weights, `None` before the first fit.
    pub fn weights(&self) -> Option<&EnsembleWeights> {
        self.weights.as_ref()
    }

    /// Fit weights from per-model validation predictions (columns ordered
    /// by model name) and the realized labels.
    pub fn fit(
        &mut self,
        predictions: &BTreeMap<String, Vec<ModelPrediction>>,
        actual: &[Label],
    ) -> CoreResult<WeightSource> {
        if predictions.is_empty() {
            return Err(CoreError::MalformedInput(
                "ensemble fit needs at least one model".into(),
            ));
        }
        if actual.is_empty() {
            return Err(CoreError::insufficient("ensemble fit", 1, 0));
        }
        for (name, preds) in predictions {
            if preds.len() != actual.len() {
                return Err(CoreError::length_mismatch(
                    format!("predictions of '{}'", name),
                    actual.len(),
                    preds.len(),
                ));
            }
        }

        let names: Vec<&String> = predictions.keys().collect();
        let n = actual.len();
        let m = names.len();

        let x = DMatrix::from_fn(n, m, |i, j| predictions[names[j]][i].signal());
        let y = DVector::from_iterator(n, actual.iter().map(|l| l.signal() as f64));

        let xt = x.transpose();
        let gram = &xt * &x + DMatrix::identity(m, m) * self.config.ridge_alpha;
        let rhs = &xt * &y;

        let weights = match gram.cholesky().map(|c| c.solve(&rhs)) {
            Some(coef) => {
                let clipped: Vec<f64> = coef.iter().map(|c| c.max(0.0)).collect();
                let total: f64 = clipped.iter().sum();
                if total > 0.0 && total.is_finite() {
                    let map: BTreeMap<String, f64> = names
                        .iter()
                        .zip(&clipped)
                        .map(|(name, w)| ((*name).clone(), w / total))
                        .collect();
                    if self.validate_weights(&map) {
                        Some(map)
                    } else {
                        None
                    }
                } else {
                    None
                }
            }
            None => None,
        };

        let fitted = match weights {
            Some(map) => {
                info!(models = m, rows = n, weights = ?map, "Ensemble weights fitted");
                EnsembleWeights {
                    weights: map,
                    source: WeightSource::Ridge,
                }
            }
            None => {
                warn!(models = m, rows = n, "Degenerate ridge fit, using uniform weights");
                EnsembleWeights::uniform(names.iter().copied())
            }
        };

        let source = fitted.source;
        self.weights = Some(fitted);
        Ok(source)
    }

    /// Weights must be finite, non-negative and sum to 1 within tolerance.
    pub fn validate_weights(&self, weights: &BTreeMap<String, f64>) -> bool {
        if weights.is_empty() || weights.values().any(|w| !w.is_finite() || *w < 0.0) {
            return false;
        }
        let sum: f64 = weights.values().sum();
        (sum - 1.0).abs() <= self.config.weight_sum_tolerance
    }

    /// Weighted sum of encoded predictions, in [-1, 1]. Before any fit the
    /// row's models are weighted uniformly.
    pub fn get_ensemble_score(&self, row: &BTreeMap<String, ModelPrediction>) -> f64 {
        let score = match &self.weights {
            Some(weights) => row
                .iter()
                .filter_map(|(name, p)| weights.get(name).map(|w| w * p.signal()))
                .sum::<f64>(),
            None => {
                if row.is_empty() {
                    return 0.0;
                }
                row.values().map(ModelPrediction::signal).sum::<f64>() / row.len() as f64
            }
        };
        score.clamp(-1.0, 1.0)
    }

    /// Scores for every row of per-model prediction columns.
    pub fn score_batch(&self, predictions: &BTreeMap<String, Vec<ModelPrediction>>) -> CoreResult<Vec<f64>> {
        let n = predictions.values().next().map(Vec::len).unwrap_or(0);
        for (name, preds) in predictions {
            if preds.len() != n {
                return Err(CoreError::length_mismatch(
                    format!("predictions of '{}'", name),
                    n,
                    preds.len(),
                ));
            }
        }

        Ok((0..n)
            .map(|i| {
                let row: BTreeMap<String, ModelPrediction> = predictions
                    .iter()
                    .map(|(name, preds)| (name.clone(), preds[i]))
                    .collect();
                self.get_ensemble_score(&row)
            })
            .collect())
    }

    /// Three-class label from a blended score.
    pub fn predict_label(&self, score: f64) -> Label {
        Label::from_score(score, self.config.neutral_band)
    }
}
