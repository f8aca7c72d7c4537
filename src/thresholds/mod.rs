//! Volatility- and horizon-adaptive thresholds for labelling forward returns.

pub mod adaptive;
pub mod labels;

pub use adaptive::{AdaptiveThresholds, ThresholdConfig, ThresholdPair, ThresholdSource};
pub use labels::{label_distribution, label_forward_returns, LabelDistribution, LabelScheme};
