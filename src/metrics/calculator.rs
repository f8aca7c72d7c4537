//! Classification metrics calculator.
//!
//! Calculates accuracy and support-weighted precision/recall/F1 over the
//! three direction classes.

use serde::{Deserialize, Serialize};

use crate::data::Label;
use crate::error::{CoreError, CoreResult};

/// Per-class precision/recall/F1.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ClassScore {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// Actual rows of this class.
    pub support: usize,
}

/// Classification metrics over a label series.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub samples: usize,
    pub accuracy: f64,

    // Support-weighted averages
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,

    /// Indexed by `Label::class_index`.
    pub per_class: [ClassScore; 3],
    /// `confusion[actual][predicted]`, indexed by `Label::class_index`.
    pub confusion: [[usize; 3]; 3],
}

impl ClassificationMetrics {
    /// Zero-division cases score 0.
    pub fn calculate(actual: &[Label], predicted: &[Label]) -> CoreResult<Self> {
        if actual.len() != predicted.len() {
            return Err(CoreError::length_mismatch(
                "predicted labels",
                actual.len(),
                predicted.len(),
            ));
        }
        if actual.is_empty() {
            return Ok(Self::default());
        }

        let mut confusion = [[0usize; 3]; 3];
        for (a, p) in actual.iter().zip(predicted) {
            confusion[a.class_index()][p.class_index()] += 1;
        }

        let n = actual.len();
        let correct: usize = (0..3).map(|c| confusion[c][c]).sum();

        let mut per_class = [ClassScore::default(); 3];
        for (c, score) in per_class.iter_mut().enumerate() {
            let tp = confusion[c][c] as f64;
            let predicted_c: usize = (0..3).map(|a| confusion[a][c]).sum();
            let support: usize = confusion[c].iter().sum();

            let precision = ratio(tp, predicted_c as f64);
            let recall = ratio(tp, support as f64);
            *score = ClassScore {
                precision,
                recall,
                f1: ratio(2.0 * precision * recall, precision + recall),
                support,
            };
        }

        let weighted = |f: fn(&ClassScore) -> f64| {
            per_class
                .iter()
                .map(|s| f(s) * s.support as f64)
                .sum::<f64>()
                / n as f64
        };

        Ok(Self {
            samples: n,
            accuracy: correct as f64 / n as f64,
            precision: weighted(|s| s.precision),
            recall: weighted(|s| s.recall),
            f1: weighted(|s| s.f1),
            per_class,
            confusion,
        })
    }

    pub fn summary(&self) -> String {
        let mut out = format!(
            "n={} accuracy={:.3} precision={:.3} recall={:.3} f1={:.3}\n",
            self.samples, self.accuracy, self.precision, self.recall, self.f1
        );
        out.push_str("actual \\ predicted   bearish  neutral  bullish\n");
        for label in Label::ALL {
            let row = self.confusion[label.class_index()];
            out.push_str(&format!(
                "{:<20} {:>7}  {:>7}  {:>7}\n",
                label.as_str(),
                row[0],
                row[1],
                row[2]
            ));
        }
        out
    }
}

fn ratio(num: f64, den: f64) -> f64 {
    if den > 0.0 {
        num / den
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use Label::*;

    #[test]
    fn test_perfect_predictions() {
        let labels = vec![Bullish, Bearish, Neutral, Bullish];
        let m = ClassificationMetrics::calculate(&labels, &labels).unwrap();
        assert_eq!(m.accuracy, 1.0);
        assert_eq!(m.f1, 1.0);
        assert_eq!(m.confusion[Bullish.class_index()][Bullish.class_index()], 2);
    }

    #[test]
    fn test_weighted_scores() {
        let actual = vec![Bullish, Bullish, Bullish, Bearish];
        let predicted = vec![Bullish, Bullish, Bearish, Bearish];
        let m = ClassificationMetrics::calculate(&actual, &predicted).unwrap();

        assert!((m.accuracy - 0.75).abs() < 1e-12);
        // bullish: p=1, r=2/3; bearish: p=0.5, r=1
        assert!((m.precision - (0.75 * 1.0 + 0.25 * 0.5)).abs() < 1e-12);
        assert!((m.recall - 0.75).abs() < 1e-12);
        assert_eq!(m.per_class[Neutral.class_index()].support, 0);
        assert_eq!(m.per_class[Neutral.class_index()].f1, 0.0);
    }

    #[test]
    fn test_length_mismatch() {
        assert!(ClassificationMetrics::calculate(&[Bullish], &[]).is_err());
    }

    #[test]
    fn test_empty_is_default() {
        let m = ClassificationMetrics::calculate(&[], &[]).unwrap();
        assert_eq!(m.samples, 0);
        assert!(m.summary().contains("n=0"));
    }
}
