//! Weighted CART decision tree.
//!
//! Classification trees minimize weighted Gini impurity and store class
//! probabilities in their leaves. Regression trees minimize weighted
//! squared error and store the weighted mean target.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Tree growth limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    pub max_depth: usize,
    /// Minimum rows required to split a node.
    pub min_samples_split: usize,
    /// Minimum rows on each side of a split.
    pub min_samples_leaf: usize,
    /// Features considered per split (None = all).
    pub max_features: Option<usize>,
    pub seed: u64,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_depth: 6,
            min_samples_split: 10,
            min_samples_leaf: 5,
            max_features: None,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Node {
    Leaf(Vec<f64>),
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn depth(&self) -> usize {
        match self {
            Node::Leaf(_) => 1,
            Node::Split { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }
}

/// Fit target: class indices or continuous values.
#[derive(Clone, Copy)]
enum Target<'a> {
    Classes { y: &'a [usize], n_classes: usize },
    Values(&'a [f64]),
}

impl Target<'_> {
    fn acc_len(&self) -> usize {
        match self {
            Target::Classes { n_classes, .. } => *n_classes,
            Target::Values(_) => 3,
        }
    }

    fn add(&self, acc: &mut [f64], i: usize, w: f64) {
        match self {
            Target::Classes { y, .. } => acc[y[i]] += w,
            Target::Values(v) => {
                acc[0] += w;
                acc[1] += w * v[i];
                acc[2] += w * v[i] * v[i];
            }
        }
    }

    fn total_weight(&self, acc: &[f64]) -> f64 {
        match self {
            Target::Classes { .. } => acc.iter().sum(),
            Target::Values(_) => acc[0],
        }
    }

    /// Weight-scaled impurity: w * gini, or the sum of squared errors.
    fn impurity(&self, acc: &[f64]) -> f64 {
        let w = self.total_weight(acc);
        if w <= 0.0 {
            return 0.0;
        }
        match self {
            Target::Classes { .. } => w - acc.iter().map(|c| c * c).sum::<f64>() / w,
            Target::Values(_) => (acc[2] - acc[1] * acc[1] / w).max(0.0),
        }
    }

    fn leaf(&self, acc: &[f64]) -> Vec<f64> {
        let w = self.total_weight(acc);
        match self {
            Target::Classes { n_classes, .. } => {
                if w > 0.0 {
                    acc.iter().map(|c| c / w).collect()
                } else {
                    vec![1.0 / *n_classes as f64; *n_classes]
                }
            }
            Target::Values(_) => vec![if w > 0.0 { acc[1] / w } else { 0.0 }],
        }
    }
}

/// Weighted CART tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    config: TreeConfig,
    root: Option<Node>,
}

impl DecisionTree {
    pub fn new(config: TreeConfig) -> Self {
        Self { config, root: None }
    }

    pub fn is_fitted(&self) -> bool {
        self.root.is_some()
    }

    pub fn depth(&self) -> usize {
        self.root.as_ref().map(Node::depth).unwrap_or(0)
    }

    /// Fit a classifier; leaves hold class probabilities.
    pub fn fit_classifier(
        &mut self,
        x: &[Vec<f64>],
        y: &[usize],
        weights: &[f64],
        n_classes: usize,
    ) -> CoreResult<()> {
        if y.iter().any(|&c| c >= n_classes) {
            return Err(CoreError::MalformedInput(format!(
                "class index outside 0..{}",
                n_classes
            )));
        }
        self.fit(x, Target::Classes { y, n_classes }, weights, y.len())
    }

    /// Fit a regressor; leaves hold the weighted mean target.
    pub fn fit_regressor(&mut self, x: &[Vec<f64>], targets: &[f64], weights: &[f64]) -> CoreResult<()> {
        self.fit(x, Target::Values(targets), weights, targets.len())
    }

    /// Leaf output for one row: class probabilities or a single value.
    pub fn predict_row(&self, row: &[f64]) -> CoreResult<&[f64]> {
        let mut node = self
            .root
            .as_ref()
            .ok_or_else(|| CoreError::NotFitted("decision tree".into()))?;
        loop {
            match node {
                Node::Leaf(value) => return Ok(value.as_slice()),
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let v = row.get(*feature).copied().ok_or_else(|| {
                        CoreError::length_mismatch("tree input row", *feature + 1, row.len())
                    })?;
                    node = if v <= *threshold { &**left } else { &**right };
                }
            }
        }
    }

    /// Single regression output for one row.
    pub fn predict_value(&self, row: &[f64]) -> CoreResult<f64> {
        Ok(self.predict_row(row)?.first().copied().unwrap_or(0.0))
    }

    fn fit(&mut self, x: &[Vec<f64>], target: Target<'_>, weights: &[f64], n: usize) -> CoreResult<()> {
        if x.len() != n {
            return Err(CoreError::length_mismatch("tree targets", x.len(), n));
        }
        if weights.len() != n {
            return Err(CoreError::length_mismatch("tree sample weights", n, weights.len()));
        }
        if n == 0 {
            return Err(CoreError::insufficient("decision tree", 1, 0));
        }

        let n_features = x[0].len();
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        let indices: Vec<usize> = (0..n).collect();
        let builder = Builder {
            config: &self.config,
            x,
            target,
            weights,
            n_features,
        };
        self.root = Some(builder.build(&indices, 0, &mut rng));
        Ok(())
    }
}

struct Builder<'a> {
    config: &'a TreeConfig,
    x: &'a [Vec<f64>],
    target: Target<'a>,
    weights: &'a [f64],
    n_features: usize,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    score: f64,
}

impl Builder<'_> {
    fn accumulate(&self, indices: &[usize]) -> Vec<f64> {
        let mut acc = vec![0.0; self.target.acc_len()];
        for &i in indices {
            self.target.add(&mut acc, i, self.weights[i]);
        }
        acc
    }

    fn build(&self, indices: &[usize], depth: usize, rng: &mut ChaCha8Rng) -> Node {
        let acc = self.accumulate(indices);
        let parent_impurity = self.target.impurity(&acc);

        if depth >= self.config.max_depth
            || indices.len() < self.config.min_samples_split.max(2)
            || parent_impurity <= 1e-12
        {
            return Node::Leaf(self.target.leaf(&acc));
        }

        let Some(best) = self.best_split(indices, &acc, parent_impurity, rng) else {
            return Node::Leaf(self.target.leaf(&acc));
        };

        let (left, right): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| self.x[i][best.feature] <= best.threshold);

        Node::Split {
            feature: best.feature,
            threshold: best.threshold,
            left: Box::new(self.build(&left, depth + 1, rng)),
            right: Box::new(self.build(&right, depth + 1, rng)),
        }
    }

    fn candidate_features(&self, rng: &mut ChaCha8Rng) -> Vec<usize> {
        let mut features: Vec<usize> = (0..self.n_features).collect();
        if let Some(k) = self.config.max_features {
            if k < self.n_features {
                features.shuffle(rng);
                features.truncate(k.max(1));
            }
        }
        features
    }

    fn best_split(
        &self,
        indices: &[usize],
        total: &[f64],
        parent_impurity: f64,
        rng: &mut ChaCha8Rng,
    ) -> Option<BestSplit> {
        let min_leaf = self.config.min_samples_leaf.max(1);
        let mut best: Option<BestSplit> = None;
        let mut sorted = indices.to_vec();

        for feature in self.candidate_features(rng) {
            sorted.sort_by(|&a, &b| self.x[a][feature].total_cmp(&self.x[b][feature]));

            let mut left = vec![0.0; total.len()];
            for pos in 0..sorted.len() - 1 {
                let i = sorted[pos];
                self.target.add(&mut left, i, self.weights[i]);

                let n_left = pos + 1;
                if n_left < min_leaf || sorted.len() - n_left < min_leaf {
                    continue;
                }
                let here = self.x[i][feature];
                let next = self.x[sorted[pos + 1]][feature];
                if next <= here {
                    continue;
                }

                let right: Vec<f64> = total.iter().zip(&left).map(|(t, l)| t - l).collect();
                let score = self.target.impurity(&left) + self.target.impurity(&right);
                if score < parent_impurity - 1e-12
                    && best.as_ref().map_or(true, |b| score < b.score)
                {
                    best = Some(BestSplit {
                        feature,
                        threshold: (here + next) / 2.0,
                        score,
                    });
                }
            }
        }

        best
    }
}

/// Balanced per-row weights: `n / (classes_present * class_count)`.
pub fn balanced_sample_weights(y: &[usize], n_classes: usize) -> Vec<f64> {
    let mut counts = vec![0usize; n_classes];
    for &c in y {
        if c < n_classes {
            counts[c] += 1;
        }
    }
    let present = counts.iter().filter(|&&c| c > 0).count().max(1) as f64;
    let n = y.len() as f64;
    y.iter()
        .map(|&c| match counts.get(c) {
            Some(&count) if count > 0 => n / (present * count as f64),
            _ => 0.0,
        })
        .collect()
}
