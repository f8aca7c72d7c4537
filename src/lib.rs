pub mod calibration;
pub mod config;
pub mod data;
pub mod drift;
pub mod ensemble;
pub mod error;
pub mod features;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod regime;
pub mod stats;
pub mod thresholds;
pub mod validation;
pub mod walkforward;

// Re-export commonly used types
pub use calibration::{CalibrationConfig, CalibrationMap, ConfidenceCalibrator};
pub use config::{ConfigError, ForecastConfig};
pub use data::{FeatureMatrix, Label, ModelPrediction, OhlcBar, PriceHistory, PriceLoader, PriceSource};
pub use drift::{DriftDetector, DriftResult, DriftSeverity};
pub use ensemble::{EnsembleWeightOptimizer, EnsembleWeights, WeightSource};
pub use error::{CoreError, CoreResult};
pub use features::FeatureBuilder;
pub use metrics::ClassificationMetrics;
pub use models::{BaggedTreeClassifier, BoostedTreeClassifier, Forecaster, ModelTrainer};
pub use pipeline::{BatchRunner, EvaluationPipeline, PipelineError, SymbolReport};
pub use regime::{RegimeClassifier, VolatilityRegime};
pub use thresholds::{AdaptiveThresholds, ThresholdPair, ThresholdSource};
pub use validation::DataIntegrityValidator;
pub use walkforward::{CrossValidationReport, Fold, PurgedWalkForwardCV};
