//! Evaluation runs.
//!
//! - `EvaluationPipeline`: one symbol from prices to ensemble, calibration
//!   and drift verdicts
//! - `BatchRunner`: independent per-symbol tasks on a rayon pool

pub mod batch;
pub mod evaluation;

pub use batch::{BatchRunner, PipelineError, SymbolOutcome};
pub use evaluation::{score_confidence, EvaluationPipeline, LatestSignal, SymbolReport};
