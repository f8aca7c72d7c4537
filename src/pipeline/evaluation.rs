//! End-to-end evaluation of one symbol.

use std::collections::BTreeMap;
use std::ops::Range;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{info, warn};

use crate::calibration::{CalibrationMap, CalibrationObservation, ConfidenceCalibrator};
use crate::config::ForecastConfig;
use crate::data::{FeatureMatrix, Label, ModelPrediction, PriceHistory};
use crate::drift::{needs_retraining, DriftDetector, DriftResult};
use crate::ensemble::{predictions_from_labels, EnsembleWeightOptimizer, EnsembleWeights};
use crate::error::{CoreError, CoreResult};
use crate::features::FeatureBuilder;
use crate::metrics::ClassificationMetrics;
use crate::models::{BaggedTreeClassifier, ForestConfig, ModelTrainer, TrainingReport};
use crate::thresholds::{
    label_distribution, label_forward_returns, AdaptiveThresholds, LabelDistribution,
    ThresholdPair,
};
use crate::walkforward::{CrossValidationReport, PurgedWalkForwardCV};

/// Confidence of a blended score: 0.5 at zero, 1.0 at ±1.
pub fn score_confidence(score: f64) -> f64 {
    (1.0 + score.abs().min(1.0)) / 2.0
}

/// Ensemble forecast for the most recent bar.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatestSignal {
    pub date: NaiveDate,
    pub score: f64,
    pub label: Label,
    pub confidence: f64,
    pub calibrated_confidence: f64,
}

/// Everything learned about one symbol in a run.
#[derive(Debug, Clone, Serialize)]
pub struct SymbolReport {
    pub symbol: String,
    pub bars: usize,
    /// Labelled rows left after dropping warm-up and non-finite rows.
    pub samples: usize,
    pub thresholds: ThresholdPair,
    pub label_distribution: LabelDistribution,
    pub cross_validation: CrossValidationReport,
    pub training: TrainingReport,
    pub ensemble_weights: EnsembleWeights,
    /// Ensemble scored on the later half of the hold-out fold, which the
    /// weights and the calibrator never saw.
    pub holdout: ClassificationMetrics,
    pub calibration: CalibrationMap,
    pub drift: Vec<DriftResult>,
    pub needs_retraining: bool,
    pub latest: Option<LatestSignal>,
}

impl SymbolReport {
    pub fn summary(&self) -> String {
        let mut s = String::new();
        s.push_str(&format!("=== {} ===\n", self.symbol));
        s.push_str(&format!(
            "Bars: {}  Samples: {}  Horizon: {}d\n",
            self.bars, self.samples, self.thresholds.horizon_days
        ));
        s.push_str(&format!(
            "Thresholds: {:+.4} / {:+.4} ({:?}{})\n",
            self.thresholds.bearish,
            self.thresholds.bullish,
            self.thresholds.source,
            if self.thresholds.widened { ", widened" } else { "" }
        ));
        s.push_str(&format!(
            "Labels: bearish {:.1}%  neutral {:.1}%  bullish {:.1}%\n",
            self.label_distribution.bearish * 100.0,
            self.label_distribution.neutral * 100.0,
            self.label_distribution.bullish * 100.0
        ));
        s.push_str(&self.cross_validation.summary());
        s.push('\n');
        s.push_str(&self.training.summary());
        s.push('\n');

        let weights: Vec<String> = self
            .ensemble_weights
            .as_map()
            .iter()
            .map(|(name, w)| format!("{}={:.3}", name, w))
            .collect();
        s.push_str(&format!(
            "Ensemble: {} ({:?})  hold-out acc={:.3} f1={:.3}\n",
            weights.join(" "),
            self.ensemble_weights.source(),
            self.holdout.accuracy,
            self.holdout.f1
        ));
        s.push_str(&format!(
            "Calibration: Brier {:.4}  ECE {:.4}\n",
            self.calibration.brier_score, self.calibration.expected_calibration_error
        ));

        let drifted = self.drift.iter().filter(|d| d.is_drifted).count();
        s.push_str(&format!(
            "Drift: {}/{} features{}\n",
            drifted,
            self.drift.len(),
            if self.needs_retraining { "  RETRAIN" } else { "" }
        ));

        if let Some(latest) = &self.latest {
            s.push_str(&format!(
                "Latest {}: {} (score {:+.3}, confidence {:.2} -> {:.2})\n",
                latest.date,
                latest.label,
                latest.score,
                latest.confidence,
                latest.calibrated_confidence
            ));
        }
        s
    }
}

/// Runs thresholds, labels, features, cross-validation, hold-out training,
/// ensembling, calibration and drift checks for one price history.
#[derive(Debug, Clone, Default)]
pub struct EvaluationPipeline {
    config: ForecastConfig,
}

impl EvaluationPipeline {
    pub fn new(config: ForecastConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    /// Cross-validation settings with the purge defaulted to the longer of
    /// the feature lookback and the label horizon.
    fn cv(&self, builder: &FeatureBuilder) -> PurgedWalkForwardCV {
        let mut cv = self.config.cv.clone();
        if cv.purge_bars == 0 {
            cv.purge_bars = builder.max_lookback().max(self.config.horizon_days);
        }
        PurgedWalkForwardCV::new(cv)
    }

    pub fn run(&self, history: &PriceHistory) -> CoreResult<SymbolReport> {
        let config = &self.config;
        let symbol = history.symbol();

        let thresholds = AdaptiveThresholds::new(config.thresholds.clone())
            .compute_thresholds_horizon(history, config.horizon_days)?;
        let mut labels = label_forward_returns(history, &thresholds, config.label_scheme);

        let builder = FeatureBuilder::new(config.features.clone());
        let all_features = builder.build(history)?;
        let mut features = all_features.slice(0, labels.len());
        let kept = features.retain_finite(&mut labels)?;
        let all_dates = history.dates();
        let dates: Vec<NaiveDate> = kept.iter().map(|&i| all_dates[i]).collect();
        let distribution = label_distribution(&labels);

        info!(
            symbol,
            bars = history.len(),
            samples = labels.len(),
            dominant = distribution.dominant_fraction(),
            "Dataset prepared"
        );

        let cv = self.cv(&builder);
        let forest = ForestConfig {
            balance_classes: config.trainer.balance_classes,
            ..config.trainer.forest.clone()
        };
        let cross_validation = cv.cross_validate_parallel(
            || BaggedTreeClassifier::new(forest.clone()),
            &features,
            &labels,
            Some(dates.as_slice()),
        )?;

        let folds = cv.folds(features.n_rows(), Some(dates.as_slice()))?;
        let holdout_fold = folds
            .last()
            .ok_or_else(|| CoreError::insufficient("hold-out fold", 1, 0))?;
        let train_x = features.select(&holdout_fold.train_indices);
        let train_y: Vec<Label> = holdout_fold.train_indices.iter().map(|&i| labels[i]).collect();
        let val_x = features.select(&holdout_fold.test_indices);
        let val_y: Vec<Label> = holdout_fold.test_indices.iter().map(|&i| labels[i]).collect();

        let mut trainer = ModelTrainer::new(config.trainer.clone());
        let training = trainer.train(&train_x, &train_y, &val_x, &val_y)?;

        let (fit_rows, score_rows) = holdout_split(val_y.len())?;
        let fit_predictions = model_predictions(&trainer, &val_x.slice(fit_rows.start, fit_rows.end));
        let fit_y = &val_y[fit_rows];
        let score_predictions =
            model_predictions(&trainer, &val_x.slice(score_rows.start, score_rows.end));
        let score_y = &val_y[score_rows];

        let mut ensemble = EnsembleWeightOptimizer::new(config.ensemble.clone());
        ensemble.fit(&fit_predictions, fit_y)?;
        let ensemble_weights = ensemble
            .weights()
            .cloned()
            .ok_or_else(|| CoreError::NotFitted("ensemble weights".into()))?;

        let fit_scores = ensemble.score_batch(&fit_predictions)?;
        let observations: Vec<CalibrationObservation> = fit_scores
            .iter()
            .zip(fit_y)
            .map(|(&s, &actual)| {
                CalibrationObservation::new(score_confidence(s), ensemble.predict_label(s), actual)
            })
            .collect();
        let mut calibrator = ConfidenceCalibrator::new(config.calibration.clone());
        let calibration = calibrator.fit(&observations).clone();

        let scores = ensemble.score_batch(&score_predictions)?;
        let ensemble_labels: Vec<Label> = scores.iter().map(|&s| ensemble.predict_label(s)).collect();
        let holdout = ClassificationMetrics::calculate(score_y, &ensemble_labels)?;

        let drift = DriftDetector::new(config.drift.clone()).detect_drift(&train_x, &val_x, None)?;
        let retrain = needs_retraining(&drift, config.retrain_drift_fraction);
        if retrain {
            warn!(symbol, "Feature drift exceeds retraining limit");
        }

        let latest = latest_signal(history, &all_features, &trainer, &ensemble, &calibrator);

        Ok(SymbolReport {
            symbol: symbol.to_string(),
            bars: history.len(),
            samples: labels.len(),
            thresholds,
            label_distribution: distribution,
            cross_validation,
            training,
            ensemble_weights,
            holdout,
            calibration,
            drift,
            needs_retraining: retrain,
            latest,
        })
    }
}

/// Chronological halves of the hold-out rows: the first fits ensemble
/// weights and calibration, the second is scored.
fn holdout_split(n: usize) -> CoreResult<(Range<usize>, Range<usize>)> {
    if n < 2 {
        return Err(CoreError::insufficient("hold-out rows", 2, n));
    }
    let mid = n / 2;
    Ok((0..mid, mid..n))
}

fn model_predictions(
    trainer: &ModelTrainer,
    features: &FeatureMatrix,
) -> BTreeMap<String, Vec<ModelPrediction>> {
    let labels: BTreeMap<String, Vec<Label>> = trainer
        .get_model_predictions(features)
        .into_iter()
        .map(|(name, outcome)| (name, outcome.labels().to_vec()))
        .collect();
    predictions_from_labels(&labels)
}

/// Forecast for the final bar, whose label is not yet known.
fn latest_signal(
    history: &PriceHistory,
    features: &FeatureMatrix,
    trainer: &ModelTrainer,
    ensemble: &EnsembleWeightOptimizer,
    calibrator: &ConfidenceCalibrator,
) -> Option<LatestSignal> {
    let last = features.n_rows().checked_sub(1)?;
    let row = features.slice(last, last + 1);
    if row.ensure_finite().is_err() {
        return None;
    }

    let score = *ensemble
        .score_batch(&model_predictions(trainer, &row))
        .ok()?
        .first()?;
    let confidence = score_confidence(score);
    Some(LatestSignal {
        date: history.bars().last()?.date,
        score,
        label: ensemble.predict_label(score),
        confidence,
        calibrated_confidence: calibrator.calibrate(confidence),
    })
}
