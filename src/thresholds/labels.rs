//! Forward-return labelling.

use serde::{Deserialize, Serialize};

use crate::data::{Label, PriceHistory};

use super::adaptive::ThresholdPair;

/// How forward returns map to labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LabelScheme {
    /// Bearish / neutral / bullish against the threshold pair.
    #[default]
    ThreeClass,
    /// Bullish when the forward return is positive, bearish otherwise.
    Binary,
}

/// Label every row whose `pair.horizon_days` forward window is complete.
///
/// The result has `history.len() - horizon` entries aligned with the first
/// rows of the history.
pub fn label_forward_returns(
    history: &PriceHistory,
    pair: &ThresholdPair,
    scheme: LabelScheme,
) -> Vec<Label> {
    history
        .forward_returns(pair.horizon_days.max(1))
        .into_iter()
        .map(|r| match scheme {
            LabelScheme::ThreeClass => pair.classify(r),
            LabelScheme::Binary => {
                if r > 0.0 {
                    Label::Bullish
                } else {
                    Label::Bearish
                }
            }
        })
        .collect()
}

/// Class fractions of a label series.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LabelDistribution {
    pub total: usize,
    pub bearish: f64,
    pub neutral: f64,
    pub bullish: f64,
}

impl LabelDistribution {
    /// Largest class fraction.
    pub fn dominant_fraction(&self) -> f64 {
        self.bearish.max(self.neutral).max(self.bullish)
    }
}

pub fn label_distribution(labels: &[Label]) -> LabelDistribution {
    if labels.is_empty() {
        return LabelDistribution::default();
    }
    let mut counts = [0usize; 3];
    for label in labels {
        counts[label.class_index()] += 1;
    }
    let total = labels.len() as f64;
    LabelDistribution {
        total: labels.len(),
        bearish: counts[Label::Bearish.class_index()] as f64 / total,
        neutral: counts[Label::Neutral.class_index()] as f64 / total,
        bullish: counts[Label::Bullish.class_index()] as f64 / total,
    }
}
