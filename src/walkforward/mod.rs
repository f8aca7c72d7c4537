//! Leakage-safe walk-forward cross-validation.
//!
//! Chronological folds with purge and embargo gaps, plus a harness that
//! trains and scores a forecaster per fold:
//! - Test blocks: `n / n_splits` rows, last block takes the remainder
//! - Purge: rows before a test block whose label window overlaps it
//! - Embargo: rows (or calendar days) after a test block

pub mod harness;
pub mod purged;

pub use harness::{evaluate_fold, CrossValidationReport, FoldScore, SkippedFold};
pub use purged::{CvConfig, Fold, PurgedWalkForwardCV, SplitMode};
