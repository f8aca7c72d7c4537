//! Stock-direction evaluation CLI.
//!
//! # Usage
//!
//! ```bash
//! # Evaluate symbols from a directory of OHLCV files
//! stockcast evaluate --data data/prices --symbols SPY,QQQ,IWM
//!
//! # Override config values from the command line
//! stockcast evaluate --config stockcast.toml --n-splits 4 --horizon-days 10
//!
//! # Horizon threshold table for one file
//! stockcast thresholds --file data/prices/SPY.csv --max-horizon 10
//!
//! # Feature drift between two feature tables
//! stockcast drift --reference train.parquet --current live.parquet
//! ```

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use stockcast::data::load_feature_table;
use stockcast::drift::{drift_report, needs_retraining};
use stockcast::{AdaptiveThresholds, BatchRunner, DriftDetector, ForecastConfig, PriceLoader};

const SEPARATOR: &str = "============================================================";

#[derive(Parser)]
#[command(name = "stockcast")]
#[command(about = "Leakage-safe evaluation of stock-direction forecasters")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

/// Numeric overrides applied on top of the configuration file.
#[derive(Args)]
struct Overrides {
    #[arg(long)]
    n_splits: Option<usize>,

    /// Embargo after each test block (rows, or calendar days for date splits)
    #[arg(long)]
    embargo_days: Option<usize>,

    #[arg(long)]
    horizon_days: Option<usize>,

    #[arg(long)]
    bearish_percentile: Option<f64>,

    #[arg(long)]
    bullish_percentile: Option<f64>,

    #[arg(long)]
    min_samples_per_bucket: Option<usize>,

    /// KS test significance level
    #[arg(long)]
    significance_level: Option<f64>,
}

impl Overrides {
    fn apply(&self, config: &mut ForecastConfig) {
        if let Some(v) = self.n_splits {
            config.cv.n_splits = v;
        }
        if let Some(v) = self.embargo_days {
            config.cv.embargo_days = v;
        }
        if let Some(v) = self.horizon_days {
            config.horizon_days = v;
        }
        if let Some(v) = self.bearish_percentile {
            config.thresholds.bearish_percentile = v;
        }
        if let Some(v) = self.bullish_percentile {
            config.thresholds.bullish_percentile = v;
        }
        if let Some(v) = self.min_samples_per_bucket {
            config.calibration.min_samples_per_bucket = v;
        }
        if let Some(v) = self.significance_level {
            config.drift.significance_level = v;
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Cross-validate, train, ensemble and calibrate per symbol
    Evaluate {
        /// Directory of {SYMBOL}.parquet / {SYMBOL}.csv files
        #[arg(short, long, default_value = "data/prices")]
        data: PathBuf,

        /// Comma-separated symbols; every file in the directory when omitted
        #[arg(long)]
        symbols: Option<String>,

        /// Worker threads
        #[arg(long)]
        threads: Option<usize>,

        /// Print reports as JSON
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        overrides: Overrides,
    },

    /// Print thresholds for horizons 1..=N
    Thresholds {
        /// OHLCV file (csv or parquet)
        #[arg(short, long)]
        file: PathBuf,

        #[arg(long, default_value_t = 10)]
        max_horizon: usize,

        #[command(flatten)]
        overrides: Overrides,
    },

    /// Compare feature distributions of two tables
    Drift {
        #[arg(long)]
        reference: PathBuf,

        #[arg(long)]
        current: PathBuf,

        #[command(flatten)]
        overrides: Overrides,
    },
}

fn load_config(path: Option<&Path>, overrides: &Overrides) -> Result<ForecastConfig> {
    let mut config = match path {
        Some(path) => ForecastConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => ForecastConfig::default(),
    };
    overrides.apply(&mut config);
    config.validate().context("Invalid configuration after overrides")?;
    Ok(config)
}

fn cmd_evaluate(
    config: ForecastConfig,
    data: PathBuf,
    symbols: Option<String>,
    json: bool,
) -> Result<()> {
    let loader = PriceLoader::new(&data);
    let symbols: Vec<String> = match symbols {
        Some(list) => list
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        None => loader
            .available_symbols()
            .with_context(|| format!("Failed to list {}", data.display()))?,
    };
    if symbols.is_empty() {
        bail!("No symbols to evaluate in {}", data.display());
    }

    let runner = BatchRunner::new(config).context("Failed to start worker pool")?;

    let pb = ProgressBar::new(symbols.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")?
            .progress_chars("=>-"),
    );
    let outcomes = runner.run_with_progress(&loader, &symbols, |symbol, _| {
        pb.set_message(symbol.to_string());
        pb.inc(1);
    });
    pb.finish_with_message("done");

    let mut failed = 0;
    for (symbol, outcome) in &outcomes {
        match outcome {
            Ok(report) if json => {
                println!("{}", serde_json::to_string_pretty(report)?);
            }
            Ok(report) => {
                println!("{}", SEPARATOR);
                print!("{}", report.summary());
            }
            Err(e) => {
                failed += 1;
                println!("{}", SEPARATOR);
                println!("{}: FAILED: {}", symbol, e);
            }
        }
    }
    println!("{}", SEPARATOR);
    println!("Evaluated {} symbols, {} failed", outcomes.len(), failed);

    Ok(())
}

fn cmd_thresholds(config: ForecastConfig, file: PathBuf, max_horizon: usize) -> Result<()> {
    let symbol = file
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "UNKNOWN".to_string());
    let history = PriceLoader::new(".")
        .load_file(&file, &symbol)
        .with_context(|| format!("Failed to load {}", file.display()))?;

    let table = AdaptiveThresholds::new(config.thresholds)
        .horizon_table(&history, max_horizon)
        .context("Threshold computation failed")?;

    println!("{}", SEPARATOR);
    println!("{} ({} bars)", symbol, history.len());
    println!("{}", SEPARATOR);
    println!("{:>3}  {:>9}  {:>9}  {:<16} {:<8} widened", "h", "bearish", "bullish", "source", "regime");
    for pair in &table {
        let regime = pair
            .regime
            .map(|r| format!("{:?}", r))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:>3}  {:>+9.4}  {:>+9.4}  {:<16} {:<8} {}",
            pair.horizon_days,
            pair.bearish,
            pair.bullish,
            format!("{:?}", pair.source),
            regime,
            if pair.widened { "yes" } else { "" }
        );
    }
    Ok(())
}

fn cmd_drift(config: ForecastConfig, reference: PathBuf, current: PathBuf) -> Result<()> {
    let reference_table = load_feature_table(&reference)
        .with_context(|| format!("Failed to load {}", reference.display()))?;
    let current_table = load_feature_table(&current)
        .with_context(|| format!("Failed to load {}", current.display()))?;

    let results = DriftDetector::new(config.drift)
        .detect_drift(&reference_table, &current_table, None)
        .context("Drift detection failed")?;

    print!("{}", drift_report(&results));
    if needs_retraining(&results, config.retrain_drift_fraction) {
        println!("\nRetraining recommended");
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("stockcast=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Evaluate {
            data,
            symbols,
            threads,
            json,
            overrides,
        } => {
            let mut config = load_config(cli.config.as_deref(), &overrides)?;
            if threads.is_some() {
                config.threads = threads;
            }
            cmd_evaluate(config, data, symbols, json)?;
        }
        Commands::Thresholds {
            file,
            max_horizon,
            overrides,
        } => {
            let config = load_config(cli.config.as_deref(), &overrides)?;
            cmd_thresholds(config, file, max_horizon)?;
        }
        Commands::Drift {
            reference,
            current,
            overrides,
        } => {
            let config = load_config(cli.config.as_deref(), &overrides)?;
            cmd_drift(config, reference, current)?;
        }
    }

    Ok(())
}
