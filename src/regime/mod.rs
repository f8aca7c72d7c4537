//! Volatility regime classification.
//!
//! Categorizes the current volatility of a close series against its own
//! rolling baseline:
//! - Low: current / baseline < 0.75
//! - Normal: in between
//! - High: current / baseline > 1.5

pub mod classifier;

pub use classifier::{RegimeClassifier, RegimeClassifierConfig, RegimeReading, VolatilityRegime};
