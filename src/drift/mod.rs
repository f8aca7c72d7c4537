//! Feature distribution drift between training and inference windows.

pub mod detector;

pub use detector::{
    drift_report, drifted_fraction, needs_retraining, DriftConfig, DriftDetector, DriftResult,
    DriftSeverity,
};
