//! Confidence calibration.
//!
//! Learns a multiplicative correction per 0.1-wide confidence bucket from
//! `(stated confidence, predicted, actual)` observations and applies it to
//! new confidences, clamped to a fixed range.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::data::Label;

/// Number of 0.1-wide buckets over [0, 1].
pub const N_BUCKETS: usize = 10;

/// Calibrator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Buckets with fewer observations keep a 1.0 factor.
    pub min_samples_per_bucket: usize,
    pub min_confidence: f64,
    pub max_confidence: f64,
    /// |factor - 1| within this band counts as already calibrated.
    pub well_calibrated_tolerance: f64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            min_samples_per_bucket: 20,
            min_confidence: 0.40,
            max_confidence: 0.95,
            well_calibrated_tolerance: 0.05,
        }
    }
}

/// One stated confidence with its outcome.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationObservation {
    pub confidence: f64,
    pub predicted: Label,
    pub actual: Label,
}

impl CalibrationObservation {
    pub fn new(confidence: f64, predicted: Label, actual: Label) -> Self {
        Self {
            confidence,
            predicted,
            actual,
        }
    }

    pub fn is_correct(&self) -> bool {
        self.predicted == self.actual
    }
}

/// Statistics of one confidence bucket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BucketStats {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
    pub mean_confidence: f64,
    pub accuracy: f64,
    /// accuracy / mean confidence, or 1.0 when under-populated.
    pub factor: f64,
}

/// Fitted per-bucket factors plus fit-time quality scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationMap {
    pub buckets: Vec<BucketStats>,
    pub observations: usize,
    pub brier_score: f64,
    pub expected_calibration_error: f64,
}

impl CalibrationMap {
    pub fn factor(&self, confidence: f64) -> f64 {
        self.buckets
            .get(bucket_index(confidence))
            .map(|b| b.factor)
            .unwrap_or(1.0)
    }
}

/// Bucket of a confidence: `[k/10, (k+1)/10)`, with 1.0 in the last bucket.
pub fn bucket_index(confidence: f64) -> usize {
    if !(confidence > 0.0) {
        return 0;
    }
    ((confidence * N_BUCKETS as f64).floor() as usize).min(N_BUCKETS - 1)
}

/// Mean squared gap between stated confidence and correctness.
pub fn brier_score(observations: &[CalibrationObservation]) -> f64 {
    if observations.is_empty() {
        return 0.0;
    }
    observations
        .iter()
        .map(|o| {
            let outcome = if o.is_correct() { 1.0 } else { 0.0 };
            (o.confidence - outcome).powi(2)
        })
        .sum::<f64>()
        / observations.len() as f64
}

/// Count-weighted mean |accuracy - confidence| over non-empty buckets.
pub fn expected_calibration_error(buckets: &[BucketStats]) -> f64 {
    let total: usize = buckets.iter().map(|b| b.count).sum();
    if total == 0 {
        return 0.0;
    }
    buckets
        .iter()
        .filter(|b| b.count > 0)
        .map(|b| b.count as f64 / total as f64 * (b.accuracy - b.mean_confidence).abs())
        .sum()
}

/// Bucketed confidence calibrator.
#[derive(Debug, Clone, Default)]
pub struct ConfidenceCalibrator {
    config: CalibrationConfig,
    map: Option<CalibrationMap>,
}

impl ConfidenceCalibrator {
    pub fn new(config: CalibrationConfig) -> Self {
        Self { config, map: None }
    }

    pub fn is_fitted(&self) -> bool {
        self.map.is_some()
    }

    pub fn map(&self) -> Option<&CalibrationMap> {
        self.map.as_ref()
    }

    /// Replace the calibration map. Observations with a non-finite
    /// confidence are ignored.
    pub fn fit(&mut self, observations: &[CalibrationObservation]) -> &CalibrationMap {
        let valid: Vec<CalibrationObservation> = observations
            .iter()
            .copied()
            .filter(|o| o.confidence.is_finite())
            .collect();
        if valid.len() < observations.len() {
            warn!(
                dropped = observations.len() - valid.len(),
                "Ignoring non-finite confidences"
            );
        }

        let mut count = [0usize; N_BUCKETS];
        let mut conf_sum = [0.0; N_BUCKETS];
        let mut correct = [0usize; N_BUCKETS];
        for o in &valid {
            let k = bucket_index(o.confidence);
            count[k] += 1;
            conf_sum[k] += o.confidence;
            if o.is_correct() {
                correct[k] += 1;
            }
        }

        let buckets: Vec<BucketStats> = (0..N_BUCKETS)
            .map(|k| {
                let n = count[k];
                let mean_confidence = if n > 0 { conf_sum[k] / n as f64 } else { 0.0 };
                let accuracy = if n > 0 { correct[k] as f64 / n as f64 } else { 0.0 };
                let factor = if n >= self.config.min_samples_per_bucket && mean_confidence > 0.0 {
                    accuracy / mean_confidence
                } else {
                    if n > 0 {
                        debug!(bucket = k, count = n, "Bucket under-populated, factor 1.0");
                    }
                    1.0
                };
                BucketStats {
                    lower: k as f64 / N_BUCKETS as f64,
                    upper: (k + 1) as f64 / N_BUCKETS as f64,
                    count: n,
                    mean_confidence,
                    accuracy,
                    factor,
                }
            })
            .collect();

        let map = CalibrationMap {
            observations: valid.len(),
            brier_score: brier_score(&valid),
            expected_calibration_error: expected_calibration_error(&buckets),
            buckets,
        };
        info!(
            observations = map.observations,
            brier = map.brier_score,
            ece = map.expected_calibration_error,
            "Calibration fitted"
        );
        self.map.insert(map)
    }

    /// Calibrated confidence in `[min_confidence, max_confidence]`; the
    /// identity before any fit.
    pub fn calibrate(&self, confidence: f64) -> f64 {
        match &self.map {
            Some(map) => {
                let (lo, hi) = self.bounds();
                (confidence * map.factor(confidence)).clamp(lo, hi)
            }
            None => confidence,
        }
    }

    /// Configured output range, reordered if given backwards. NaN bounds
    /// fall back to `[0, 1]`.
    fn bounds(&self) -> (f64, f64) {
        let (a, b) = (self.config.min_confidence, self.config.max_confidence);
        if a.is_nan() || b.is_nan() {
            return (0.0, 1.0);
        }
        (a.min(b), a.max(b))
    }

    pub fn calibration_report(&self) -> String {
        let Some(map) = &self.map else {
            return "Calibrator not fitted\n".to_string();
        };

        let mut report = String::new();
        report.push_str("=== CONFIDENCE CALIBRATION ===\n\n");
        report.push_str(&format!(
            "Observations: {}  Brier: {:.4}  ECE: {:.4}\n\n",
            map.observations, map.brier_score, map.expected_calibration_error
        ));
        report.push_str("bucket       count  mean_conf  accuracy  factor\n");
        for b in map.buckets.iter().filter(|b| b.count > 0) {
            let flag = if b.count < self.config.min_samples_per_bucket {
                "  (too few samples)"
            } else if (b.factor - 1.0).abs() > self.config.well_calibrated_tolerance {
                if b.factor < 1.0 {
                    "  OVERCONFIDENT"
                } else {
                    "  UNDERCONFIDENT"
                }
            } else {
                ""
            };
            report.push_str(&format!(
                "[{:.1}, {:.1})  {:>6}  {:>9.3}  {:>8.3}  {:>6.3}{}\n",
                b.lower, b.upper, b.count, b.mean_confidence, b.accuracy, b.factor, flag
            ));
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    /// Stated confidence near 0.8, realized accuracy near 0.6.
    fn overconfident(n: usize, seed: u64) -> Vec<CalibrationObservation> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        (0..n)
            .map(|_| {
                let confidence = rng.gen_range(0.80..0.90);
                let hit = rng.gen_bool(confidence - 0.20);
                let actual = if hit { Label::Bullish } else { Label::Bearish };
                CalibrationObservation::new(confidence, Label::Bullish, actual)
            })
            .collect()
    }

    #[test]
    fn test_identity_before_fit() {
        let calibrator = ConfidenceCalibrator::default();
        for x in [0.0, 0.13, 0.5, 0.99, 1.0] {
            assert_eq!(calibrator.calibrate(x), x);
        }
    }

    #[test]
    fn test_overconfidence_shifts_down() {
        let mut calibrator = ConfidenceCalibrator::default();
        calibrator.fit(&overconfident(300, 1));

        let out = calibrator.calibrate(0.80);
        assert!(out < 0.80);
        assert!(out >= 0.40);
        assert!(calibrator.calibration_report().contains("OVERCONFIDENT"));
    }

    #[test]
    fn test_output_range_after_fit() {
        let mut calibrator = ConfidenceCalibrator::default();
        let mut obs = overconfident(300, 2);
        obs.extend((0..50).map(|_| CalibrationObservation::new(0.15, Label::Bullish, Label::Bullish)));
        calibrator.fit(&obs);

        for i in 0..=100 {
            let x = i as f64 / 100.0;
            let y = calibrator.calibrate(x);
            assert!((0.40..=0.95).contains(&y), "x={} y={}", x, y);
        }
    }

    #[test]
    fn test_sparse_bucket_keeps_unit_factor() {
        let mut calibrator = ConfidenceCalibrator::default();
        let obs: Vec<_> = (0..5)
            .map(|_| CalibrationObservation::new(0.65, Label::Bullish, Label::Bearish))
            .collect();
        let map = calibrator.fit(&obs);
        assert_eq!(map.buckets[6].count, 5);
        assert_eq!(map.buckets[6].factor, 1.0);
        assert!((calibrator.calibrate(0.65) - 0.65).abs() < 1e-12);
    }

    #[test]
    fn test_bucket_edges() {
        assert_eq!(bucket_index(0.0), 0);
        assert_eq!(bucket_index(0.1), 1);
        assert_eq!(bucket_index(0.999), 9);
        assert_eq!(bucket_index(1.0), 9);
        assert_eq!(bucket_index(-0.2), 0);
    }

    #[test]
    fn test_brier_and_ece() {
        let obs = vec![
            CalibrationObservation::new(1.0, Label::Bullish, Label::Bullish),
            CalibrationObservation::new(0.5, Label::Bullish, Label::Bearish),
        ];
        assert!((brier_score(&obs) - 0.125).abs() < 1e-12);

        let mut calibrator = ConfidenceCalibrator::default();
        let map = calibrator.fit(&obs);
        // bucket 9: acc 1, conf 1; bucket 5: acc 0, conf 0.5
        assert!((map.expected_calibration_error - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_reversed_bounds_are_reordered() {
        let mut calibrator = ConfidenceCalibrator::new(CalibrationConfig {
            min_confidence: 0.9,
            max_confidence: 0.5,
            ..CalibrationConfig::default()
        });
        calibrator.fit(&[]);
        assert!((calibrator.calibrate(0.7) - 0.7).abs() < 1e-12);
        assert!((calibrator.calibrate(0.99) - 0.9).abs() < 1e-12);
        assert!((calibrator.calibrate(0.2) - 0.5).abs() < 1e-12);
    }
}
