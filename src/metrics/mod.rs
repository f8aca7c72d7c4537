//! Classification metrics module.
//!
//! Provides the validation scores recorded per trained model:
//! - Accuracy
//! - Support-weighted precision, recall, F1
//! - Confusion matrix

pub mod calculator;

pub use calculator::{ClassScore, ClassificationMetrics};
