//! Feature drift detection.
//!
//! Two-sample Kolmogorov-Smirnov test per feature between a reference
//! (training-time) sample and a current one.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::data::FeatureMatrix;
use crate::error::{CoreError, CoreResult};

/// Drift detector configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriftConfig {
    pub significance_level: f64,
    /// Below this many rows in either sample the test is skipped.
    pub min_samples: usize,
    /// KS statistic a drift verdict additionally requires.
    pub drift_statistic_threshold: f64,
    pub low_severity: f64,
    pub medium_severity: f64,
    pub high_severity: f64,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            significance_level: 0.05,
            min_samples: 30,
            drift_statistic_threshold: 0.1,
            low_severity: 0.1,
            medium_severity: 0.2,
            high_severity: 0.3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DriftSeverity {
    None,
    Low,
    Medium,
    High,
}

impl fmt::Display for DriftSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => "none",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        };
        f.write_str(s)
    }
}

/// Drift verdict for one feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftResult {
    pub feature: String,
    pub statistic: f64,
    pub p_value: f64,
    pub is_drifted: bool,
    pub severity: DriftSeverity,
    pub reference_samples: usize,
    pub current_samples: usize,
}

/// Two-sample KS drift detector.
#[derive(Debug, Clone, Default)]
pub struct DriftDetector {
    config: DriftConfig,
}

impl DriftDetector {
    pub fn new(config: DriftConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DriftConfig {
        &self.config
    }

    fn severity(&self, statistic: f64) -> DriftSeverity {
        if statistic >= self.config.high_severity {
            DriftSeverity::High
        } else if statistic >= self.config.medium_severity {
            DriftSeverity::Medium
        } else if statistic >= self.config.low_severity {
            DriftSeverity::Low
        } else {
            DriftSeverity::None
        }
    }

    /// Compare one feature. Non-finite values are ignored; with fewer than
    /// `min_samples` values on either side the verdict is not drifted with
    /// `p_value = 1.0`.
    pub fn detect_feature_drift(&self, feature: &str, reference: &[f64], current: &[f64]) -> DriftResult {
        let mut a: Vec<f64> = reference.iter().copied().filter(|v| v.is_finite()).collect();
        let mut b: Vec<f64> = current.iter().copied().filter(|v| v.is_finite()).collect();

        if a.len() < self.config.min_samples || b.len() < self.config.min_samples {
            debug!(
                feature,
                reference = a.len(),
                current = b.len(),
                min = self.config.min_samples,
                "Too few samples for drift test"
            );
            return DriftResult {
                feature: feature.to_string(),
                statistic: 0.0,
                p_value: 1.0,
                is_drifted: false,
                severity: DriftSeverity::None,
                reference_samples: a.len(),
                current_samples: b.len(),
            };
        }

        a.sort_by(|x, y| x.total_cmp(y));
        b.sort_by(|x, y| x.total_cmp(y));
        let statistic = ks_statistic(&a, &b);
        let p_value = ks_p_value(statistic, a.len(), b.len());

        DriftResult {
            feature: feature.to_string(),
            statistic,
            p_value,
            is_drifted: p_value < self.config.significance_level
                && statistic >= self.config.drift_statistic_threshold,
            severity: self.severity(statistic),
            reference_samples: a.len(),
            current_samples: b.len(),
        }
    }

    /// Compare every named feature, or every column present in both
    /// matrices (reference order) when `features` is `None`.
    pub fn detect_drift(
        &self,
        reference: &FeatureMatrix,
        current: &FeatureMatrix,
        features: Option<&[String]>,
    ) -> CoreResult<Vec<DriftResult>> {
        let names: Vec<String> = match features {
            Some(names) => names.to_vec(),
            None => reference
                .names()
                .iter()
                .filter(|n| current.column_index(n).is_some())
                .cloned()
                .collect(),
        };

        let mut results = Vec::with_capacity(names.len());
        for name in &names {
            let (Some(r), Some(c)) = (reference.column(name), current.column(name)) else {
                return Err(CoreError::MalformedInput(format!(
                    "feature '{}' missing from reference or current data",
                    name
                )));
            };
            results.push(self.detect_feature_drift(name, &r, &c));
        }

        let drifted = results.iter().filter(|r| r.is_drifted).count();
        if drifted > 0 {
            warn!(drifted, total = results.len(), "Feature drift detected");
        } else {
            info!(total = results.len(), "No feature drift detected");
        }
        Ok(results)
    }
}

/// Fraction of analyzed features flagged as drifted.
pub fn drifted_fraction(results: &[DriftResult]) -> f64 {
    if results.is_empty() {
        return 0.0;
    }
    results.iter().filter(|r| r.is_drifted).count() as f64 / results.len() as f64
}

/// Whether more than `max_fraction` of the features drifted.
pub fn needs_retraining(results: &[DriftResult], max_fraction: f64) -> bool {
    drifted_fraction(results) > max_fraction
}

pub fn drift_report(results: &[DriftResult]) -> String {
    let mut report = String::new();
    report.push_str("=== FEATURE DRIFT REPORT ===\n\n");
    report.push_str(&format!(
        "{:<24} {:>8} {:>10} {:>8}  {}\n",
        "feature", "ks_stat", "p_value", "severity", "verdict"
    ));
    for r in results {
        let verdict = if r.is_drifted {
            "DRIFTED"
        } else if r.p_value >= 1.0 && r.statistic == 0.0 {
            "inconclusive"
        } else {
            "stable"
        };
        report.push_str(&format!(
            "{:<24} {:>8.4} {:>10.4} {:>8}  {}\n",
            r.feature,
            r.statistic,
            r.p_value,
            r.severity.to_string(),
            verdict
        ));
    }
    report.push_str(&format!(
        "\n{}/{} features drifted ({:.0}%)\n",
        results.iter().filter(|r| r.is_drifted).count(),
        results.len(),
        drifted_fraction(results) * 100.0
    ));
    report
}

/// Largest gap between the empirical CDFs of two sorted samples.
fn ks_statistic(a: &[f64], b: &[f64]) -> f64 {
    let (n, m) = (a.len() as f64, b.len() as f64);
    let (mut i, mut j) = (0, 0);
    let mut d: f64 = 0.0;
    while i < a.len() && j < b.len() {
        let v = a[i].min(b[j]);
        while i < a.len() && a[i] <= v {
            i += 1;
        }
        while j < b.len() && b[j] <= v {
            j += 1;
        }
        d = d.max((i as f64 / n - j as f64 / m).abs());
    }
    d
}

/// Asymptotic Kolmogorov p-value with the Stephens small-sample correction.
fn ks_p_value(statistic: f64, n: usize, m: usize) -> f64 {
    let en = ((n * m) as f64 / (n + m) as f64).sqrt();
    let lambda = (en + 0.12 + 0.11 / en) * statistic;
    kolmogorov_q(lambda)
}

/// Q_KS(λ) = 2 Σ (-1)^(j-1) exp(-2 j² λ²).
fn kolmogorov_q(lambda: f64) -> f64 {
    if lambda < 0.2 {
        return 1.0;
    }
    let a2 = -2.0 * lambda * lambda;
    let mut sum = 0.0;
    let mut sign = 1.0;
    let mut prev_term = 0.0;
    for j in 1..=100 {
        let term = sign * 2.0 * (a2 * (j * j) as f64).exp();
        sum += term;
        if term.abs() <= 1e-10 * prev_term || term.abs() <= 1e-12 * sum.abs() {
            return sum.clamp(0.0, 1.0);
        }
        sign = -sign;
        prev_term = term.abs();
    }
    sum.clamp(0.0, 1.0)
}
