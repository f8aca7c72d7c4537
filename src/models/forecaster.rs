//! Base forecaster capability set.
//!
//! The evaluation core is agnostic to the classifier behind a prediction:
//! anything that can `train` on a feature slice and `predict_batch` one
//! label per row plugs into cross-validation and the ensemble.

use serde::{Deserialize, Serialize};

use crate::data::{FeatureMatrix, Label};
use crate::error::{CoreError, CoreResult};

/// Column names recognized in tabular prediction output, in lookup order.
pub const PREDICTION_COLUMNS: [&str; 2] = ["predicted_label", "prediction"];

/// A trainable direction classifier.
pub trait Forecaster: Send {
    fn name(&self) -> &str;

    /// Fit on `features`/`labels`. Fails with `InsufficientData` when fewer
    /// than `min_samples` rows are supplied.
    fn train(&mut self, features: &FeatureMatrix, labels: &[Label], min_samples: usize)
        -> CoreResult<()>;

    fn predict_batch(&self, features: &FeatureMatrix) -> CoreResult<PredictionOutput>;
}

/// Shared precondition check for `Forecaster::train` implementations.
pub fn check_training_input(
    name: &str,
    features: &FeatureMatrix,
    labels: &[Label],
    min_samples: usize,
) -> CoreResult<()> {
    if features.n_rows() != labels.len() {
        return Err(CoreError::length_mismatch(
            format!("{} training labels", name),
            features.n_rows(),
            labels.len(),
        ));
    }
    if features.n_rows() < min_samples.max(1) {
        return Err(CoreError::insufficient(
            format!("{} training", name),
            min_samples.max(1),
            features.n_rows(),
        ));
    }
    features.ensure_finite()
}

/// Named string columns returned by table-style forecasters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictionTable {
    columns: Vec<(String, Vec<String>)>,
}

impl PredictionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_column(mut self, name: &str, values: Vec<String>) -> Self {
        self.columns.push((name.to_string(), values));
        self
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|(name, _)| name.clone()).collect()
    }

    /// Parse the first recognized label column.
    pub fn resolve(&self) -> CoreResult<Vec<Label>> {
        let column = PREDICTION_COLUMNS
            .iter()
            .find_map(|wanted| self.columns.iter().find(|(name, _)| name == wanted))
            .ok_or_else(|| CoreError::UnknownPredictionColumn {
                expected: PREDICTION_COLUMNS.iter().map(|s| s.to_string()).collect(),
                found: self.column_names(),
            })?;

        column.1.iter().map(|v| v.parse::<Label>()).collect()
    }
}

/// Output of `Forecaster::predict_batch`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PredictionOutput {
    Labels(Vec<Label>),
    Table(PredictionTable),
}

impl PredictionOutput {
    /// One label per row, checked against the expected row count.
    pub fn into_labels(self, expected_rows: usize) -> CoreResult<Vec<Label>> {
        let labels = match self {
            Self::Labels(labels) => labels,
            Self::Table(table) => table.resolve()?,
        };
        if labels.len() != expected_rows {
            return Err(CoreError::length_mismatch(
                "prediction output",
                expected_rows,
                labels.len(),
            ));
        }
        Ok(labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_resolve_predicted_label_first() {
        let table = PredictionTable::new()
            .with_column("prediction", strings(&["bearish"]))
            .with_column("predicted_label", strings(&["bullish"]));
        assert_eq!(table.resolve().unwrap(), vec![Label::Bullish]);
    }

    #[test]
    fn test_resolve_prediction_column() {
        let output = PredictionOutput::Table(
            PredictionTable::new().with_column("prediction", strings(&["neutral", "Bearish"])),
        );
        assert_eq!(
            output.into_labels(2).unwrap(),
            vec![Label::Neutral, Label::Bearish]
        );
    }

    #[test]
    fn test_unknown_column() {
        let table = PredictionTable::new().with_column("signal", strings(&["bullish"]));
        match table.resolve() {
            Err(CoreError::UnknownPredictionColumn { expected, found }) => {
                assert_eq!(expected.len(), 2);
                assert_eq!(found, vec!["signal".to_string()]);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_row_count_checked() {
        let output = PredictionOutput::Labels(vec![Label::Bullish]);
        assert!(matches!(
            output.into_labels(3),
            Err(CoreError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn test_training_input_checks() {
        let features = FeatureMatrix::new(vec!["x".into()], vec![vec![1.0]; 5]).unwrap();
        let labels = vec![Label::Neutral; 5];
        assert!(check_training_input("m", &features, &labels, 10)
            .unwrap_err()
            .is_insufficient_data());
        assert!(check_training_input("m", &features, &labels, 5).is_ok());
        assert!(check_training_input("m", &features, &labels[..4], 1).is_err());
    }
}
