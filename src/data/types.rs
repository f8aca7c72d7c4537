//! Core data types for direction forecasting.
//!
//! These types carry price history in from the data-acquisition side and
//! carry labels and predictions between the evaluation components.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::validation::DataIntegrityValidator;

/// Direction label for a forward-return window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Bearish,
    Neutral,
    Bullish,
}

impl Label {
    /// All labels in class-index order.
    pub const ALL: [Label; 3] = [Label::Bearish, Label::Neutral, Label::Bullish];

    /// Numeric encoding: bullish 1, neutral 0, bearish -1.
    pub fn signal(&self) -> i8 {
        match self {
            Self::Bullish => 1,
            Self::Neutral => 0,
            Self::Bearish => -1,
        }
    }

    pub fn from_signal(signal: i8) -> Self {
        match signal.signum() {
            1 => Self::Bullish,
            -1 => Self::Bearish,
            _ => Self::Neutral,
        }
    }

    /// Map a blended score in [-1, 1] to a label using a symmetric neutral band.
    pub fn from_score(score: f64, band: f64) -> Self {
        if score > band {
            Self::Bullish
        } else if score < -band {
            Self::Bearish
        } else {
            Self::Neutral
        }
    }

    /// Dense class index used by the tree models.
    pub fn class_index(&self) -> usize {
        match self {
            Self::Bearish => 0,
            Self::Neutral => 1,
            Self::Bullish => 2,
        }
    }

    pub fn from_class_index(index: usize) -> Self {
        match index {
            0 => Self::Bearish,
            2 => Self::Bullish,
            _ => Self::Neutral,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bullish => "bullish",
            Self::Neutral => "neutral",
            Self::Bearish => "bearish",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Label {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "bullish" => Ok(Self::Bullish),
            "neutral" => Ok(Self::Neutral),
            "bearish" => Ok(Self::Bearish),
            other => Err(CoreError::MalformedInput(format!("unknown label '{}'", other))),
        }
    }
}

/// One base model's output for a single row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ModelPrediction {
    Label(Label),
    /// Probability of the bullish (class-1) outcome.
    Probability(f64),
}

impl ModelPrediction {
    /// Signal in [-1, 1]. Probabilities map through 2p - 1.
    pub fn signal(&self) -> f64 {
        match self {
            Self::Label(label) => label.signal() as f64,
            Self::Probability(p) => (2.0 * p.clamp(0.0, 1.0)) - 1.0,
        }
    }

    pub fn label(&self) -> Label {
        match self {
            Self::Label(label) => *label,
            Self::Probability(p) => {
                if *p >= 0.5 {
                    Label::Bullish
                } else {
                    Label::Bearish
                }
            }
        }
    }
}

impl From<Label> for ModelPrediction {
    fn from(label: Label) -> Self {
        Self::Label(label)
    }
}

/// A single daily OHLCV bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OhlcBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl OhlcBar {
    /// True range against the previous close.
    pub fn true_range(&self, prev_close: Option<f64>) -> f64 {
        let range = self.high - self.low;
        match prev_close {
            Some(pc) => range.max((self.high - pc).abs()).max((self.low - pc).abs()),
            None => range,
        }
    }
}

/// Time-ordered price history for one symbol.
///
/// Construction enforces the boundary contract: ascending dates, no
/// duplicates, consistent OHLC values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceHistory {
    symbol: String,
    bars: Vec<OhlcBar>,
}

impl PriceHistory {
    pub fn new(symbol: &str, bars: Vec<OhlcBar>) -> CoreResult<Self> {
        let report = DataIntegrityValidator::new().validate(symbol, &bars);
        if !report.all_passed() {
            return Err(CoreError::MalformedInput(report.failure_details()));
        }

        Ok(Self {
            symbol: symbol.to_string(),
            bars,
        })
    }

    /// Build a close-only history on consecutive calendar days.
    pub fn from_closes(symbol: &str, start: NaiveDate, closes: &[f64]) -> CoreResult<Self> {
        let bars = closes
            .iter()
            .enumerate()
            .map(|(i, &close)| OhlcBar {
                date: start + chrono::Duration::days(i as i64),
                open: close,
                high: close,
                low: close,
                close,
                volume: 0.0,
            })
            .collect();
        Self::new(symbol, bars)
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn bars(&self) -> &[OhlcBar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.bars.iter().map(|b| b.date).collect()
    }

    pub fn last_close(&self) -> Option<f64> {
        self.bars.last().map(|b| b.close)
    }

    /// Simple one-bar returns; length is `len() - 1`.
    pub fn simple_returns(&self) -> Vec<f64> {
        self.bars
            .windows(2)
            .map(|w| w[1].close / w[0].close - 1.0)
            .collect()
    }

    /// Cumulative forward returns over `horizon` bars for every row whose
    /// window is complete.
    pub fn forward_returns(&self, horizon: usize) -> Vec<f64> {
        if horizon == 0 || self.bars.len() <= horizon {
            return Vec::new();
        }
        (0..self.bars.len() - horizon)
            .map(|i| self.bars[i + horizon].close / self.bars[i].close - 1.0)
            .collect()
    }
}
