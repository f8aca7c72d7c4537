//! Lookback-window technical features built from a price history.

pub mod builder;

pub use builder::{FeatureBuilder, FeatureConfig};
