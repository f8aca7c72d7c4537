//! Per-fold train/score harness.

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::data::{FeatureMatrix, Label};
use crate::error::{CoreError, CoreResult};
use crate::models::Forecaster;

use super::purged::{Fold, PurgedWalkForwardCV};

/// Score of one evaluated fold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldScore {
    pub fold_id: usize,
    /// Fraction of test rows whose predicted signal matches the actual one.
    pub accuracy: f64,
    pub train_size: usize,
    pub test_size: usize,
}

/// A fold that could not be trained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedFold {
    pub fold_id: usize,
    pub reason: String,
}

/// Cross-validation summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossValidationReport {
    pub model: String,
    pub fold_scores: Vec<FoldScore>,
    pub skipped: Vec<SkippedFold>,
    pub mean: f64,
    /// Population standard deviation of fold accuracies.
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

impl CrossValidationReport {
    fn from_scores(
        model: &str,
        mut fold_scores: Vec<FoldScore>,
        mut skipped: Vec<SkippedFold>,
    ) -> CoreResult<Self> {
        if fold_scores.is_empty() {
            return Err(CoreError::insufficient(
                format!("cross-validation of {} ({} folds skipped)", model, skipped.len()),
                1,
                0,
            ));
        }
        fold_scores.sort_by_key(|s| s.fold_id);
        skipped.sort_by_key(|s| s.fold_id);

        let n = fold_scores.len() as f64;
        let mean = fold_scores.iter().map(|s| s.accuracy).sum::<f64>() / n;
        let variance = fold_scores
            .iter()
            .map(|s| (s.accuracy - mean).powi(2))
            .sum::<f64>()
            / n;
        let min = fold_scores
            .iter()
            .map(|s| s.accuracy)
            .fold(f64::INFINITY, f64::min);
        let max = fold_scores
            .iter()
            .map(|s| s.accuracy)
            .fold(f64::NEG_INFINITY, f64::max);

        Ok(Self {
            model: model.to_string(),
            fold_scores,
            skipped,
            mean,
            std: variance.sqrt(),
            min,
            max,
        })
    }

    pub fn summary(&self) -> String {
        format!(
            "{}: {} folds scored, {} skipped | accuracy mean={:.3} std={:.3} min={:.3} max={:.3}",
            self.model,
            self.fold_scores.len(),
            self.skipped.len(),
            self.mean,
            self.std,
            self.min,
            self.max
        )
    }
}

/// Train on the fold's train slice, predict its test slice and return the
/// fraction of rows whose predicted signal equals the actual one.
pub fn evaluate_fold<M: Forecaster + ?Sized>(
    model: &mut M,
    features: &FeatureMatrix,
    labels: &[Label],
    fold: &Fold,
    min_train_samples: usize,
) -> CoreResult<FoldScore> {
    if labels.len() != features.n_rows() {
        return Err(CoreError::length_mismatch(
            "label series",
            features.n_rows(),
            labels.len(),
        ));
    }
    if fold.test_indices.is_empty() {
        return Err(CoreError::insufficient(
            format!("fold {} test slice", fold.fold_id),
            1,
            0,
        ));
    }

    let train_x = features.select(&fold.train_indices);
    let train_y: Vec<Label> = fold.train_indices.iter().map(|&i| labels[i]).collect();
    model.train(&train_x, &train_y, min_train_samples)?;

    let test_x = features.select(&fold.test_indices);
    let predicted = model
        .predict_batch(&test_x)?
        .into_labels(fold.test_indices.len())?;

    let hits = fold
        .test_indices
        .iter()
        .zip(&predicted)
        .filter(|(i, p)| p.signal() == labels[**i].signal())
        .count();

    Ok(FoldScore {
        fold_id: fold.fold_id,
        accuracy: hits as f64 / fold.test_indices.len() as f64,
        train_size: fold.train_indices.len(),
        test_size: fold.test_indices.len(),
    })
}

impl PurgedWalkForwardCV {
    /// Folds for `n_samples` rows, date-embargoed when `dates` is given.
    pub fn folds(&self, n_samples: usize, dates: Option<&[NaiveDate]>) -> CoreResult<Vec<Fold>> {
        match dates {
            Some(dates) => self.split_with_dates(dates, n_samples),
            None => self.split(n_samples),
        }
    }

    /// Evaluate `model` on every fold in order.
    ///
    /// Folds whose training fails with insufficient data are skipped and
    /// listed in the report; any other error aborts.
    pub fn cross_validate<M: Forecaster + ?Sized>(
        &self,
        model: &mut M,
        features: &FeatureMatrix,
        labels: &[Label],
        dates: Option<&[NaiveDate]>,
    ) -> CoreResult<CrossValidationReport> {
        let folds = self.folds(features.n_rows(), dates)?;
        let name = model.name().to_string();
        let min_train = self.config().min_train_samples;

        let mut scores = Vec::with_capacity(folds.len());
        let mut skipped = Vec::new();
        for fold in &folds {
            match evaluate_fold(model, features, labels, fold, min_train) {
                Ok(score) => {
                    info!(
                        model = %name,
                        fold = score.fold_id,
                        train = score.train_size,
                        test = score.test_size,
                        accuracy = score.accuracy,
                        "Fold evaluated"
                    );
                    scores.push(score);
                }
                Err(e) if e.is_insufficient_data() => {
                    warn!(model = %name, fold = fold.fold_id, error = %e, "Fold skipped");
                    skipped.push(SkippedFold {
                        fold_id: fold.fold_id,
                        reason: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        CrossValidationReport::from_scores(&name, scores, skipped)
    }

    /// Like `cross_validate`, with one rayon task per fold. Each task owns
    /// a fresh model from `factory`.
    pub fn cross_validate_parallel<M, F>(
        &self,
        factory: F,
        features: &FeatureMatrix,
        labels: &[Label],
        dates: Option<&[NaiveDate]>,
    ) -> CoreResult<CrossValidationReport>
    where
        M: Forecaster,
        F: Fn() -> M + Sync,
    {
        let folds = self.folds(features.n_rows(), dates)?;
        let min_train = self.config().min_train_samples;
        let name = factory().name().to_string();

        let outcomes: Vec<(usize, CoreResult<FoldScore>)> = folds
            .par_iter()
            .map(|fold| {
                let mut model = factory();
                (
                    fold.fold_id,
                    evaluate_fold(&mut model, features, labels, fold, min_train),
                )
            })
            .collect();

        let mut scores = Vec::with_capacity(outcomes.len());
        let mut skipped = Vec::new();
        for (fold_id, outcome) in outcomes {
            match outcome {
                Ok(score) => scores.push(score),
                Err(e) if e.is_insufficient_data() => {
                    warn!(model = %name, fold = fold_id, error = %e, "Fold skipped");
                    skipped.push(SkippedFold {
                        fold_id,
                        reason: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        let report = CrossValidationReport::from_scores(&name, scores, skipped)?;
        info!("{}", report.summary());
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{check_training_input, PredictionOutput, PredictionTable};
    use crate::walkforward::{CvConfig, SplitMode};

    /// Predicts bullish when the single feature is positive.
    struct SignModel {
        trained: bool,
        as_table: bool,
    }

    impl SignModel {
        fn new() -> Self {
            Self {
                trained: false,
                as_table: false,
            }
        }
    }

    impl Forecaster for SignModel {
        fn name(&self) -> &str {
            "sign"
        }

        fn train(
            &mut self,
            features: &FeatureMatrix,
            labels: &[Label],
            min_samples: usize,
        ) -> CoreResult<()> {
            check_training_input(self.name(), features, labels, min_samples)?;
            self.trained = true;
            Ok(())
        }

        fn predict_batch(&self, features: &FeatureMatrix) -> CoreResult<PredictionOutput> {
            if !self.trained {
                return Err(CoreError::NotFitted("sign".into()));
            }
            let labels: Vec<Label> = features
                .rows()
                .iter()
                .map(|r| if r[0] > 0.0 { Label::Bullish } else { Label::Bearish })
                .collect();
            if self.as_table {
                let values = labels.iter().map(|l| l.to_string()).collect();
                Ok(PredictionOutput::Table(
                    PredictionTable::new().with_column("label", values),
                ))
            } else {
                Ok(PredictionOutput::Labels(labels))
            }
        }
    }

    fn dataset(n: usize) -> (FeatureMatrix, Vec<Label>) {
        let rows: Vec<Vec<f64>> = (0..n)
            .map(|i| vec![if i % 3 == 0 { -1.0 } else { 1.0 }])
            .collect();
        // every fourth row mislabelled
        let labels = rows
            .iter()
            .enumerate()
            .map(|(i, r)| {
                let correct = if r[0] > 0.0 { Label::Bullish } else { Label::Bearish };
                if i % 4 == 0 {
                    Label::Neutral
                } else {
                    correct
                }
            })
            .collect();
        (
            FeatureMatrix::new(vec!["x".into()], rows).unwrap(),
            labels,
        )
    }

    #[test]
    fn test_evaluate_fold_accuracy() {
        let (features, labels) = dataset(500);
        let cv = PurgedWalkForwardCV::default();
        let folds = cv.split(500).unwrap();
        let score = evaluate_fold(&mut SignModel::new(), &features, &labels, &folds[2], 50).unwrap();
        assert_eq!(score.test_size, 100);
        assert!((score.accuracy - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_cross_validate_skips_untrainable_fold() {
        let (features, labels) = dataset(500);
        let report = PurgedWalkForwardCV::default()
            .cross_validate(&mut SignModel::new(), &features, &labels, None)
            .unwrap();

        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].fold_id, 1);
        assert_eq!(report.fold_scores.len(), 4);
        assert!(report.min <= report.mean && report.mean <= report.max);
        assert!(report.std >= 0.0);
    }

    #[test]
    fn test_all_folds_skipped_is_error() {
        let (features, labels) = dataset(100);
        let cv = PurgedWalkForwardCV::new(CvConfig {
            min_train_samples: 1_000,
            ..CvConfig::default()
        });
        let err = cv
            .cross_validate(&mut SignModel::new(), &features, &labels, None)
            .unwrap_err();
        assert!(err.is_insufficient_data());
    }

    #[test]
    fn test_unknown_prediction_column_propagates() {
        let (features, labels) = dataset(500);
        let mut model = SignModel::new();
        model.as_table = true;
        let err = PurgedWalkForwardCV::default()
            .cross_validate(&mut model, &features, &labels, None)
            .unwrap_err();
        assert!(matches!(err, CoreError::UnknownPredictionColumn { .. }));
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let (features, labels) = dataset(600);
        let cv = PurgedWalkForwardCV::new(CvConfig {
            mode: SplitMode::PurgedKFold,
            ..CvConfig::default()
        });
        let sequential = cv
            .cross_validate(&mut SignModel::new(), &features, &labels, None)
            .unwrap();
        let parallel = cv
            .cross_validate_parallel(SignModel::new, &features, &labels, None)
            .unwrap();
        assert_eq!(sequential.fold_scores, parallel.fold_scores);
        assert!((sequential.mean - parallel.mean).abs() < 1e-12);
    }

    #[test]
    fn test_date_length_mismatch_surfaces() {
        let (features, labels) = dataset(100);
        let dates = vec![NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(); 99];
        let err = PurgedWalkForwardCV::default()
            .cross_validate(&mut SignModel::new(), &features, &labels, Some(dates.as_slice()))
            .unwrap_err();
        assert!(matches!(err, CoreError::LengthMismatch { .. }));
    }
}
