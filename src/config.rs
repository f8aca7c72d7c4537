//! Aggregated run configuration.
//!
//! Every section is optional in the TOML file; missing keys keep their
//! defaults.
//!
//! ```toml
//! horizon_days = 5
//!
//! [cv]
//! n_splits = 5
//! embargo_days = 20
//!
//! [thresholds]
//! bearish_percentile = 35.0
//! bullish_percentile = 65.0
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::calibration::CalibrationConfig;
use crate::drift::DriftConfig;
use crate::ensemble::EnsembleConfig;
use crate::features::FeatureConfig;
use crate::models::TrainerConfig;
use crate::thresholds::{LabelScheme, ThresholdConfig};
use crate::walkforward::CvConfig;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value: {0}")]
    Invalid(String),
}

/// Configuration of one evaluation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    /// Forecast horizon in trading days.
    pub horizon_days: usize,
    pub label_scheme: LabelScheme,
    /// Drifted-feature fraction above which a symbol is flagged for retraining.
    pub retrain_drift_fraction: f64,
    /// Worker threads for batch runs; `None` uses rayon's default.
    pub threads: Option<usize>,
    pub features: FeatureConfig,
    pub thresholds: ThresholdConfig,
    pub cv: CvConfig,
    pub trainer: TrainerConfig,
    pub ensemble: EnsembleConfig,
    pub drift: DriftConfig,
    pub calibration: CalibrationConfig,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            horizon_days: 5,
            label_scheme: LabelScheme::ThreeClass,
            retrain_drift_fraction: 0.5,
            threads: None,
            features: FeatureConfig::default(),
            thresholds: ThresholdConfig::default(),
            cv: CvConfig::default(),
            trainer: TrainerConfig::default(),
            ensemble: EnsembleConfig::default(),
            drift: DriftConfig::default(),
            calibration: CalibrationConfig::default(),
        }
    }
}

impl ForecastConfig {
    /// Load from a TOML file and validate.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Self = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values no component can work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.horizon_days == 0 {
            return Err(ConfigError::Invalid("horizon_days must be >= 1".into()));
        }
        if self.cv.n_splits < 2 {
            return Err(ConfigError::Invalid(format!(
                "cv.n_splits must be >= 2, got {}",
                self.cv.n_splits
            )));
        }
        let t = &self.thresholds;
        if !(0.0..=100.0).contains(&t.bearish_percentile)
            || !(0.0..=100.0).contains(&t.bullish_percentile)
            || t.bearish_percentile >= t.bullish_percentile
        {
            return Err(ConfigError::Invalid(format!(
                "percentiles must satisfy 0 <= bearish < bullish <= 100, got {} / {}",
                t.bearish_percentile, t.bullish_percentile
            )));
        }
        let alpha = self.drift.significance_level;
        if !(alpha > 0.0 && alpha < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "drift.significance_level must be in (0, 1), got {}",
                alpha
            )));
        }
        let c = &self.calibration;
        if c.min_confidence > c.max_confidence {
            return Err(ConfigError::Invalid(format!(
                "calibration confidence range is empty: [{}, {}]",
                c.min_confidence, c.max_confidence
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_toml_gives_defaults() {
        let config: ForecastConfig = toml::from_str("").unwrap();
        assert_eq!(config.horizon_days, 5);
        assert_eq!(config.cv.n_splits, 5);
        assert_eq!(config.cv.embargo_days, 20);
        assert!((config.thresholds.bearish_percentile - 35.0).abs() < 1e-12);
        assert!((config.ensemble.neutral_band - 0.33).abs() < 1e-12);
        assert_eq!(config.calibration.min_samples_per_bucket, 20);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config: ForecastConfig = toml::from_str(
            "horizon_days = 10\n\
             [cv]\n\
             n_splits = 3\n\
             [drift]\n\
             significance_level = 0.01\n",
        )
        .unwrap();

        assert_eq!(config.horizon_days, 10);
        assert_eq!(config.cv.n_splits, 3);
        assert_eq!(config.cv.embargo_days, 20);
        assert!((config.drift.significance_level - 0.01).abs() < 1e-12);
        assert_eq!(config.drift.min_samples, 30);
    }

    #[test]
    fn test_from_file_rejects_bad_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"[thresholds]\nbearish_percentile = 70.0\n").unwrap();

        assert!(matches!(
            ForecastConfig::from_file(&path),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_from_file_missing() {
        assert!(matches!(
            ForecastConfig::from_file("/nonexistent/stockcast.toml"),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn test_round_trip_defaults() {
        let text = toml::to_string(&ForecastConfig::default()).unwrap();
        let back: ForecastConfig = toml::from_str(&text).unwrap();
        assert_eq!(back.trainer.forest.n_trees, 50);
        assert_eq!(back.features.rsi_period, 14);
    }
}
