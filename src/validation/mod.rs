//! Validation of incoming price data.
//!
//! Checks the boundary contract with the data-acquisition side before any
//! labels or features are derived from a history.

pub mod data_integrity;

pub use data_integrity::{CheckResult, DataIntegrityReport, DataIntegrityValidator};
