//! Recalibration of stated model confidence against realized accuracy.

pub mod calibrator;

pub use calibrator::{
    brier_score, bucket_index, expected_calibration_error, BucketStats, CalibrationConfig,
    CalibrationMap, CalibrationObservation, ConfidenceCalibrator, N_BUCKETS,
};
