//! Price history, labels, predictions and feature matrices.

pub mod loader;
pub mod matrix;
pub mod types;

pub use loader::{load_feature_table, LoaderError, PriceLoader, PriceSource};
pub use matrix::FeatureMatrix;
pub use types::{Label, ModelPrediction, OhlcBar, PriceHistory};
