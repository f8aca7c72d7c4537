//! Multi-class gradient boosting over regression trees.
//!
//! One regression tree per class per stage, fit to the softmax residuals
//! `1{y = k} - p_k`. Raw scores start from smoothed log class priors.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::data::{FeatureMatrix, Label};
use crate::error::{CoreError, CoreResult};

use super::forecaster::{check_training_input, Forecaster, PredictionOutput};
use super::forest::argmax;
use super::tree::{balanced_sample_weights, DecisionTree, TreeConfig};

const N_CLASSES: usize = 3;

/// Boosting hyperparameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostingConfig {
    /// Boosting stages.
    pub n_estimators: usize,
    /// Shrinkage applied to each stage.
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    pub seed: u64,
    pub balance_classes: bool,
}

impl Default for BoostingConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 3,
            min_samples_leaf: 5,
            seed: 7,
            balance_classes: true,
        }
    }
}

/// Softmax gradient-boosted trees.
#[derive(Debug, Clone)]
pub struct BoostedTreeClassifier {
    config: BoostingConfig,
    init_scores: [f64; N_CLASSES],
    stages: Vec<[DecisionTree; N_CLASSES]>,
}

impl Default for BoostedTreeClassifier {
    fn default() -> Self {
        Self::new(BoostingConfig::default())
    }
}

impl BoostedTreeClassifier {
    pub fn new(config: BoostingConfig) -> Self {
        Self {
            config,
            init_scores: [0.0; N_CLASSES],
            stages: Vec::new(),
        }
    }

    pub fn n_stages(&self) -> usize {
        self.stages.len()
    }

    fn raw_scores(&self, row: &[f64]) -> CoreResult<[f64; N_CLASSES]> {
        let mut scores = self.init_scores;
        for stage in &self.stages {
            for (k, tree) in stage.iter().enumerate() {
                scores[k] += self.config.learning_rate * tree.predict_value(row)?;
            }
        }
        Ok(scores)
    }

    pub fn predict_proba(&self, row: &[f64]) -> CoreResult<[f64; N_CLASSES]> {
        if self.stages.is_empty() {
            return Err(CoreError::NotFitted("boosted trees".into()));
        }
        Ok(softmax(self.raw_scores(row)?))
    }

    fn tree_config(&self, stage: usize, class: usize) -> TreeConfig {
        TreeConfig {
            max_depth: self.config.max_depth,
            min_samples_split: self.config.min_samples_leaf * 2,
            min_samples_leaf: self.config.min_samples_leaf,
            max_features: None,
            seed: self
                .config
                .seed
                .wrapping_add((stage * N_CLASSES + class) as u64),
        }
    }
}

fn softmax(scores: [f64; N_CLASSES]) -> [f64; N_CLASSES] {
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exp = scores.map(|s| (s - max).exp());
    let total: f64 = exp.iter().sum();
    exp.map(|e| e / total)
}

impl Forecaster for BoostedTreeClassifier {
    fn name(&self) -> &str {
        "boosted_trees"
    }

    fn train(&mut self, features: &FeatureMatrix, labels: &[Label], min_samples: usize) -> CoreResult<()> {
        check_training_input(self.name(), features, labels, min_samples)?;

        let x = features.rows();
        let y: Vec<usize> = labels.iter().map(Label::class_index).collect();
        let n = y.len();
        let weights = if self.config.balance_classes {
            balanced_sample_weights(&y, N_CLASSES)
        } else {
            vec![1.0; n]
        };

        // Priors use the same row weights as the stage trees.
        let mut mass = [0.0; N_CLASSES];
        for (&c, &w) in y.iter().zip(&weights) {
            mass[c] += w;
        }
        let total: f64 = mass.iter().sum();
        self.init_scores = mass.map(|m| ((m + 1.0) / (total + N_CLASSES as f64)).ln());
        self.stages.clear();

        let mut scores: Vec<[f64; N_CLASSES]> = vec![self.init_scores; n];
        for stage in 0..self.config.n_estimators.max(1) {
            let probs: Vec<[f64; N_CLASSES]> = scores.iter().map(|s| softmax(*s)).collect();

            let mut trees = Vec::with_capacity(N_CLASSES);
            for k in 0..N_CLASSES {
                let residuals: Vec<f64> = (0..n)
                    .map(|i| (if y[i] == k { 1.0 } else { 0.0 }) - probs[i][k])
                    .collect();
                let mut tree = DecisionTree::new(self.tree_config(stage, k));
                tree.fit_regressor(x, &residuals, &weights)?;
                for (i, row) in x.iter().enumerate() {
                    scores[i][k] += self.config.learning_rate * tree.predict_value(row)?;
                }
                trees.push(tree);
            }

            let stage_trees: [DecisionTree; N_CLASSES] = trees
                .try_into()
                .map_err(|_| CoreError::Numerical("boosting stage size".into()))?;
            self.stages.push(stage_trees);
        }

        debug!(
            stages = self.stages.len(),
            rows = n,
            "Boosted trees trained"
        );
        Ok(())
    }

    fn predict_batch(&self, features: &FeatureMatrix) -> CoreResult<PredictionOutput> {
        let labels = features
            .rows()
            .iter()
            .map(|row| Ok(Label::from_class_index(argmax(&self.predict_proba(row)?))))
            .collect::<CoreResult<Vec<Label>>>()?;
        Ok(PredictionOutput::Labels(labels))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::synthetic;

    #[test]
    fn test_softmax_normalizes() {
        let p = softmax([1000.0, 1000.0, 1000.0]);
        for v in p {
            assert!((v - 1.0 / 3.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_boosting_beats_chance() {
        let (x, y) = synthetic(600, 11);
        let mut model = BoostedTreeClassifier::new(BoostingConfig {
            n_estimators: 40,
            ..BoostingConfig::default()
        });
        model.train(&x.slice(0, 400), &y[..400], 50).unwrap();
        assert_eq!(model.n_stages(), 40);

        let predicted = model
            .predict_batch(&x.slice(400, 600))
            .unwrap()
            .into_labels(200)
            .unwrap();
        let hits = predicted.iter().zip(&y[400..]).filter(|(p, a)| p == a).count();
        assert!(hits as f64 / 200.0 > 0.6);
    }

    #[test]
    fn test_init_scores_follow_priors() {
        let (x, _) = synthetic(60, 12);
        let labels = vec![Label::Bullish; 60];
        let mut model = BoostedTreeClassifier::new(BoostingConfig {
            n_estimators: 1,
            ..BoostingConfig::default()
        });
        model.train(&x, &labels, 10).unwrap();
        let probs = model.predict_proba(x.row(0).unwrap()).unwrap();
        assert_eq!(argmax(&probs), Label::Bullish.class_index());
    }

    #[test]
    fn test_balanced_priors_are_uniform() {
        let (x, _) = synthetic(60, 14);
        let labels: Vec<Label> = (0..60)
            .map(|i| match i % 6 {
                0 => Label::Bearish,
                1 => Label::Neutral,
                _ => Label::Bullish,
            })
            .collect();

        let mut balanced = BoostedTreeClassifier::new(BoostingConfig {
            n_estimators: 1,
            balance_classes: true,
            ..BoostingConfig::default()
        });
        balanced.train(&x, &labels, 10).unwrap();
        for s in balanced.init_scores {
            assert!((s - balanced.init_scores[0]).abs() < 1e-12);
        }

        let mut raw = BoostedTreeClassifier::new(BoostingConfig {
            n_estimators: 1,
            balance_classes: false,
            ..BoostingConfig::default()
        });
        raw.train(&x, &labels, 10).unwrap();
        let bullish = Label::Bullish.class_index();
        let bearish = Label::Bearish.class_index();
        assert!(raw.init_scores[bullish] > raw.init_scores[bearish]);
    }

    #[test]
    fn test_unfitted_predict() {
        let (x, _) = synthetic(3, 13);
        assert!(matches!(
            BoostedTreeClassifier::default().predict_batch(&x),
            Err(CoreError::NotFitted(_))
        ));
    }
}
