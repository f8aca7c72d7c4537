//! Bagged decision-tree classifier.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::data::{FeatureMatrix, Label};
use crate::error::{CoreError, CoreResult};

use super::forecaster::{check_training_input, Forecaster, PredictionOutput};
use super::tree::{balanced_sample_weights, DecisionTree, TreeConfig};

const N_CLASSES: usize = 3;

/// Bagging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestConfig {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features per split (sqrt of total if None).
    pub max_features: Option<usize>,
    pub seed: u64,
    /// Weight rows inversely to class frequency.
    pub balance_classes: bool,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 50,
            max_depth: 6,
            min_samples_split: 10,
            min_samples_leaf: 5,
            max_features: None,
            seed: 42,
            balance_classes: true,
        }
    }
}

/// Bootstrap-aggregated classification trees.
#[derive(Debug, Clone)]
pub struct BaggedTreeClassifier {
    config: ForestConfig,
    trees: Vec<DecisionTree>,
}

impl BaggedTreeClassifier {
    pub fn new(config: ForestConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
        }
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Mean class probabilities across trees, in class-index order.
    pub fn predict_proba(&self, row: &[f64]) -> CoreResult<[f64; N_CLASSES]> {
        if self.trees.is_empty() {
            return Err(CoreError::NotFitted("bagged trees".into()));
        }
        let mut probs = [0.0; N_CLASSES];
        for tree in &self.trees {
            for (p, v) in probs.iter_mut().zip(tree.predict_row(row)?) {
                *p += v;
            }
        }
        let n = self.trees.len() as f64;
        Ok(probs.map(|p| p / n))
    }
}

impl Default for BaggedTreeClassifier {
    fn default() -> Self {
        Self::new(ForestConfig::default())
    }
}

/// Index of the largest probability; ties resolve to the lower index.
pub(crate) fn argmax(probs: &[f64]) -> usize {
    probs
        .iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |(bi, bv), (i, &v)| {
            if v > bv {
                (i, v)
            } else {
                (bi, bv)
            }
        })
        .0
}

impl Forecaster for BaggedTreeClassifier {
    fn name(&self) -> &str {
        "bagged_trees"
    }

    fn train(&mut self, features: &FeatureMatrix, labels: &[Label], min_samples: usize) -> CoreResult<()> {
        check_training_input(self.name(), features, labels, min_samples)?;

        let x = features.rows();
        let y: Vec<usize> = labels.iter().map(Label::class_index).collect();
        let weights = if self.config.balance_classes {
            balanced_sample_weights(&y, N_CLASSES)
        } else {
            vec![1.0; y.len()]
        };

        let n = x.len();
        let n_features = features.n_features();
        let max_features = self
            .config
            .max_features
            .unwrap_or_else(|| ((n_features as f64).sqrt().ceil() as usize).max(1));
        let config = &self.config;

        let trees: CoreResult<Vec<DecisionTree>> = (0..config.n_trees.max(1))
            .into_par_iter()
            .map(|t| {
                let seed = config.seed.wrapping_add(t as u64);
                let mut rng = ChaCha8Rng::seed_from_u64(seed);
                let sample: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();

                let bx: Vec<Vec<f64>> = sample.iter().map(|&i| x[i].clone()).collect();
                let by: Vec<usize> = sample.iter().map(|&i| y[i]).collect();
                let bw: Vec<f64> = sample.iter().map(|&i| weights[i]).collect();

                let mut tree = DecisionTree::new(TreeConfig {
                    max_depth: config.max_depth,
                    min_samples_split: config.min_samples_split,
                    min_samples_leaf: config.min_samples_leaf,
                    max_features: Some(max_features),
                    seed,
                });
                tree.fit_classifier(&bx, &by, &bw, N_CLASSES)?;
                Ok(tree)
            })
            .collect();

        self.trees = trees?;
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
    fn test_forest_beats_chance() {
        let (x, y) = synthetic(600, 1);
        let mut model = BaggedTreeClassifier::new(ForestConfig {
            n_trees: 20,
            ..ForestConfig::default()
        });
        model.train(&x.slice(0, 400), &y[..400], 50).unwrap();
        assert_eq!(model.n_trees(), 20);

        let predicted = model
            .predict_batch(&x.slice(400, 600))
            .unwrap()
            .into_labels(200)
            .unwrap();
        let hits = predicted.iter().zip(&y[400..]).filter(|(p, a)| p == a).count();
        assert!(hits as f64 / 200.0 > 0.6);
    }

    #[test]
    fn test_deterministic_for_seed() {
        let (x, y) = synthetic(200, 2);
        let mut a = BaggedTreeClassifier::default();
        let mut b = BaggedTreeClassifier::default();
        a.train(&x, &y, 10).unwrap();
        b.train(&x, &y, 10).unwrap();
        let row = x.row(0).unwrap();
        assert_eq!(a.predict_proba(row).unwrap(), b.predict_proba(row).unwrap());
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let (x, y) = synthetic(200, 3);
        let mut model = BaggedTreeClassifier::default();
        model.train(&x, &y, 10).unwrap();
        let probs = model.predict_proba(x.row(5).unwrap()).unwrap();
        assert!((probs.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_insufficient_training_rows() {
        let (x, y) = synthetic(20, 4);
        let err = BaggedTreeClassifier::default().train(&x, &y, 50).unwrap_err();
        assert!(err.is_insufficient_data());
    }

    #[test]
    fn test_predict_before_train() {
        let (x, _) = synthetic(5, 5);
        assert!(BaggedTreeClassifier::default().predict_batch(&x).is_err());
    }

    #[test]
    fn test_argmax_ties_low_index() {
        assert_eq!(argmax(&[0.4, 0.4, 0.2]), 0);
        assert_eq!(argmax(&[0.1, 0.3, 0.6]), 2);
    }
}
