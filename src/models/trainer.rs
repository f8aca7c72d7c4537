//! Base-model trainer.
//!
//! Trains the fixed pair of base classifiers on a fold, scores both on the
//! validation slice and isolates single-model prediction failures.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::data::{FeatureMatrix, Label};
use crate::error::{CoreError, CoreResult};
use crate::metrics::ClassificationMetrics;

use super::boosting::{BoostedTreeClassifier, BoostingConfig};
use super::forecaster::Forecaster;
use super::forest::{BaggedTreeClassifier, ForestConfig};

/// Trainer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    pub forest: ForestConfig,
    pub boosting: BoostingConfig,
    /// Applied to both base models.
    pub balance_classes: bool,
    pub min_train_samples: usize,
    /// Train-minus-validation accuracy above which a warning is logged.
    pub overfit_warning_margin: f64,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            forest: ForestConfig::default(),
            boosting: BoostingConfig::default(),
            balance_classes: true,
            min_train_samples: 50,
            overfit_warning_margin: 0.15,
        }
    }
}

/// Scores of one trained model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelReport {
    pub name: String,
    pub train_samples: usize,
    pub validation_samples: usize,
    pub train_accuracy: f64,
    pub validation: ClassificationMetrics,
    /// Train accuracy minus validation accuracy.
    pub overfit_margin: f64,
}

impl ModelReport {
    pub fn is_overfit(&self, margin: f64) -> bool {
        self.overfit_margin > margin
    }
}

/// Reports for every base model trained on one fold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    pub models: Vec<ModelReport>,
}

impl TrainingReport {
    pub fn get(&self, name: &str) -> Option<&ModelReport> {
        self.models.iter().find(|m| m.name == name)
    }

    pub fn summary(&self) -> String {
        self.models
            .iter()
            .map(|m| {
                format!(
                    "{}: train_acc={:.3} val_acc={:.3} f1={:.3} overfit={:+.3} (n={}/{})",
                    m.name,
                    m.train_accuracy,
                    m.validation.accuracy,
                    m.validation.f1,
                    m.overfit_margin,
                    m.train_samples,
                    m.validation_samples
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Per-model batch prediction result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ModelOutcome {
    Predicted(Vec<Label>),
    /// The model failed; every row was substituted with neutral.
    Fallback { labels: Vec<Label>, reason: String },
}

impl ModelOutcome {
    pub fn labels(&self) -> &[Label] {
        match self {
            Self::Predicted(labels) => labels,
            Self::Fallback { labels, .. } => labels,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }
}

/// Trains and queries the base models.
pub struct ModelTrainer {
    config: TrainerConfig,
    models: Vec<Box<dyn Forecaster>>,
}

impl ModelTrainer {
    /// Bagged and boosted trees configured from `config`.
    pub fn new(config: TrainerConfig) -> Self {
        let forest = ForestConfig {
            balance_classes: config.balance_classes,
            ..config.forest.clone()
        };
        let boosting = BoostingConfig {
            balance_classes: config.balance_classes,
            ..config.boosting.clone()
        };
        let models: Vec<Box<dyn Forecaster>> = vec![
            Box::new(BaggedTreeClassifier::new(forest)),
            Box::new(BoostedTreeClassifier::new(boosting)),
        ];
        Self { config, models }
    }

    /// Custom model set.
    pub fn with_models(config: TrainerConfig, models: Vec<Box<dyn Forecaster>>) -> Self {
        Self { config, models }
    }

    pub fn model_names(&self) -> Vec<String> {
        self.models.iter().map(|m| m.name().to_string()).collect()
    }

    pub fn train(
        &mut self,
        train_x: &FeatureMatrix,
        train_y: &[Label],
        val_x: &FeatureMatrix,
        val_y: &[Label],
    ) -> CoreResult<TrainingReport> {
        if val_x.n_rows() != val_y.len() {
            return Err(CoreError::length_mismatch(
                "validation labels",
                val_x.n_rows(),
                val_y.len(),
            ));
        }
        if val_y.is_empty() {
            return Err(CoreError::insufficient("validation slice", 1, 0));
        }

        let mut reports = Vec::with_capacity(self.models.len());
        for model in self.models.iter_mut() {
            model.train(train_x, train_y, self.config.min_train_samples)?;

            let train_pred = model.predict_batch(train_x)?.into_labels(train_x.n_rows())?;
            let val_pred = model.predict_batch(val_x)?.into_labels(val_x.n_rows())?;

            let train_accuracy = ClassificationMetrics::calculate(train_y, &train_pred)?.accuracy;
            let validation = ClassificationMetrics::calculate(val_y, &val_pred)?;
            let overfit_margin = train_accuracy - validation.accuracy;

            info!(
                model = model.name(),
                train = train_y.len(),
                validation = val_y.len(),
                train_accuracy,
                val_accuracy = validation.accuracy,
                f1 = validation.f1,
                overfit_margin,
                "Model trained"
            );
            if overfit_margin > self.config.overfit_warning_margin {
                warn!(
                    model = model.name(),
                    overfit_margin,
                    limit = self.config.overfit_warning_margin,
                    "Train/validation accuracy gap exceeds limit"
                );
            }

            reports.push(ModelReport {
                name: model.name().to_string(),
                train_samples: train_y.len(),
                validation_samples: val_y.len(),
                train_accuracy,
                validation,
                overfit_margin,
            });
        }

        Ok(TrainingReport { models: reports })
    }

    /// Predicted labels per model. A model whose prediction fails gets
    /// neutral for every row; the others are unaffected.
    pub fn get_model_predictions(&self, features: &FeatureMatrix) -> BTreeMap<String, ModelOutcome> {
        let n = features.n_rows();
        self.models
            .iter()
            .map(|model| {
                let outcome = match model
                    .predict_batch(features)
                    .and_then(|out| out.into_labels(n))
                {
                    Ok(labels) => ModelOutcome::Predicted(labels),
                    Err(e) => {
                        warn!(model = model.name(), error = %e, "Prediction failed, substituting neutral");
                        ModelOutcome::Fallback {
                            labels: vec![Label::Neutral; n],
                            reason: e.to_string(),
                        }
                    }
                };
                (model.name().to_string(), outcome)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::synthetic;
    use crate::models::PredictionOutput;

    struct Broken;

    impl Forecaster for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn train(&mut self, _: &FeatureMatrix, _: &[Label], _: usize) -> CoreResult<()> {
            Ok(())
        }

        fn predict_batch(&self, _: &FeatureMatrix) -> CoreResult<PredictionOutput> {
            Err(CoreError::Numerical("boom".into()))
        }
    }

    fn small_config() -> TrainerConfig {
        TrainerConfig {
            forest: ForestConfig {
                n_trees: 10,
                ..ForestConfig::default()
            },
            boosting: BoostingConfig {
                n_estimators: 20,
                ..BoostingConfig::default()
            },
            ..TrainerConfig::default()
        }
    }

    #[test]
    fn test_train_reports_both_models() {
        let (x, y) = synthetic(500, 21);
        let mut trainer = ModelTrainer::new(small_config());
        let report = trainer
            .train(&x.slice(0, 400), &y[..400], &x.slice(400, 500), &y[400..])
            .unwrap();

        assert_eq!(report.models.len(), 2);
        let forest = report.get("bagged_trees").unwrap();
        assert_eq!(forest.train_samples, 400);
        assert_eq!(forest.validation_samples, 100);
        assert!(
            (forest.overfit_margin - (forest.train_accuracy - forest.validation.accuracy)).abs()
                < 1e-12
        );
        assert!(report.get("boosted_trees").is_some());
        assert!(report.summary().contains("bagged_trees"));
    }

    #[test]
    fn test_insufficient_training_surfaces() {
        let (x, y) = synthetic(60, 22);
        let mut trainer = ModelTrainer::new(small_config());
        let err = trainer
            .train(&x.slice(0, 30), &y[..30], &x.slice(30, 60), &y[30..])
            .unwrap_err();
        assert!(err.is_insufficient_data());
    }

    #[test]
    fn test_failed_model_falls_back_to_neutral() {
        let (x, y) = synthetic(200, 23);
        let models: Vec<Box<dyn Forecaster>> = vec![
            Box::new(BaggedTreeClassifier::new(ForestConfig {
                n_trees: 5,
                ..ForestConfig::default()
            })),
            Box::new(Broken),
        ];
        let mut trainer = ModelTrainer::with_models(small_config(), models);
        trainer.models[0].train(&x, &y, 10).unwrap();

        let outcomes = trainer.get_model_predictions(&x.slice(0, 10));
        assert_eq!(outcomes.len(), 2);
        assert!(!outcomes["bagged_trees"].is_fallback());
        let broken = &outcomes["broken"];
        assert!(broken.is_fallback());
        assert_eq!(broken.labels(), &[Label::Neutral; 10]);
    }

    #[test]
    fn test_unfitted_models_fall_back() {
        let (x, _) = synthetic(10, 24);
        let trainer = ModelTrainer::new(small_config());
        let outcomes = trainer.get_model_predictions(&x);
        assert!(outcomes.values().all(ModelOutcome::is_fallback));
        assert_eq!(trainer.model_names(), vec!["bagged_trees", "boosted_trees"]);
    }
}
