//! Parallel per-symbol runs.

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};
use thiserror::Error;
use tracing::{error, info};

use crate::config::ForecastConfig;
use crate::data::{LoaderError, PriceSource};
use crate::error::CoreError;

use super::evaluation::{EvaluationPipeline, SymbolReport};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Loading failed: {0}")]
    Loader(#[from] LoaderError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] ThreadPoolBuildError),
}

/// Result of one symbol's task.
pub type SymbolOutcome = (String, Result<SymbolReport, PipelineError>);

/// Runs one independent evaluation per symbol on a dedicated rayon pool.
///
/// Prices come from the injected `PriceSource`; tasks share nothing else.
pub struct BatchRunner {
    pipeline: EvaluationPipeline,
    pool: ThreadPool,
}

impl BatchRunner {
    /// Pool sized by `config.threads`, or rayon's default when unset.
    pub fn new(config: ForecastConfig) -> Result<Self, PipelineError> {
        let mut builder = ThreadPoolBuilder::new();
        if let Some(threads) = config.threads {
            builder = builder.num_threads(threads);
        }
        Ok(Self {
            pool: builder.build()?,
            pipeline: EvaluationPipeline::new(config),
        })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    pub fn run<S: PriceSource + ?Sized>(&self, source: &S, symbols: &[String]) -> Vec<SymbolOutcome> {
        self.run_with_progress(source, symbols, |_, _| {})
    }

    /// Like `run`, calling `on_done(symbol, ok)` as each task finishes.
    /// Outcomes are returned in input order.
    pub fn run_with_progress<S, F>(&self, source: &S, symbols: &[String], on_done: F) -> Vec<SymbolOutcome>
    where
        S: PriceSource + ?Sized,
        F: Fn(&str, bool) + Sync,
    {
        info!(symbols = symbols.len(), threads = self.threads(), "Starting batch");
        self.pool.install(|| {
            symbols
                .par_iter()
                .map(|symbol| {
                    let outcome = self.run_symbol(source, symbol);
                    if let Err(e) = &outcome {
                        error!(symbol = %symbol, error = %e, "Symbol failed");
                    }
                    on_done(symbol, outcome.is_ok());
                    (symbol.clone(), outcome)
                })
                .collect()
        })
    }

    fn run_symbol<S: PriceSource + ?Sized>(
        &self,
        source: &S,
        symbol: &str,
    ) -> Result<SymbolReport, PipelineError> {
        let history = source.load(symbol)?;
        Ok(self.pipeline.run(&history)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::PriceHistory;
    use crate::pipeline::evaluation::tests::{fast_config, random_walk};
    use std::collections::HashMap;

    struct MemorySource {
        histories: HashMap<String, PriceHistory>,
    }

    impl PriceSource for MemorySource {
        fn load(&self, symbol: &str) -> Result<PriceHistory, LoaderError> {
            self.histories
                .get(symbol)
                .cloned()
                .ok_or_else(|| LoaderError::FileNotFound(symbol.to_string()))
        }
    }

    #[test]
    fn test_batch_isolates_failures() {
        let mut histories = HashMap::new();
        histories.insert("AAA".to_string(), random_walk("AAA", 400, 1));
        histories.insert("TINY".to_string(), random_walk("TINY", 20, 2));
        let source = MemorySource { histories };

        let config = ForecastConfig {
            threads: Some(2),
            ..fast_config()
        };
        let runner = BatchRunner::new(config).unwrap();
        assert_eq!(runner.threads(), 2);

        let symbols: Vec<String> = ["AAA", "MISSING", "TINY"].iter().map(|s| s.to_string()).collect();
        let done = std::sync::atomic::AtomicUsize::new(0);
        let outcomes = runner.run_with_progress(&source, &symbols, |_, _| {
            done.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        });

        assert_eq!(done.into_inner(), 3);
        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[0].0, "AAA");
        assert!(outcomes[0].1.is_ok());
        assert!(matches!(outcomes[1].1, Err(PipelineError::Loader(_))));
        assert!(matches!(outcomes[2].1, Err(PipelineError::Core(_))));
    }
}
