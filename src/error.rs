//! Error taxonomy shared by the evaluation core.
//!
//! Insufficient data and malformed input are surfaced to the caller.
//! Degenerate fits and single-model failures are recovered in place and
//! never show up here.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("Insufficient data for {context}: need at least {required} samples, got {actual}")]
    InsufficientData {
        context: String,
        required: usize,
        actual: usize,
    },

    #[error("Length mismatch in {context}: expected {expected}, got {actual}")]
    LengthMismatch {
        context: String,
        expected: usize,
        actual: usize,
    },

    #[error("Unknown prediction column: expected one of {expected:?}, found {found:?}")]
    UnknownPredictionColumn {
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Model not fitted: {0}")]
    NotFitted(String),

    #[error("Numerical failure: {0}")]
    Numerical(String),
}

impl CoreError {
    pub fn insufficient(context: impl Into<String>, required: usize, actual: usize) -> Self {
        Self::InsufficientData {
            context: context.into(),
            required,
            actual,
        }
    }

    pub fn length_mismatch(context: impl Into<String>, expected: usize, actual: usize) -> Self {
        Self::LengthMismatch {
            context: context.into(),
            expected,
            actual,
        }
    }

    /// Whether the caller could recover by shrinking the window or skipping.
    pub fn is_insufficient_data(&self) -> bool {
        matches!(self, Self::InsufficientData { .. })
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_data_message() {
        let err = CoreError::insufficient("fold 1 training", 50, 0);
        assert!(err.is_insufficient_data());
        assert_eq!(
            err.to_string(),
            "Insufficient data for fold 1 training: need at least 50 samples, got 0"
        );
    }

    #[test]
    fn test_length_mismatch_is_not_insufficient() {
        let err = CoreError::length_mismatch("dates", 500, 499);
        assert!(!err.is_insufficient_data());
        assert!(err.to_string().contains("expected 500, got 499"));
    }
}
