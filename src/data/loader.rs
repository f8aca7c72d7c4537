//! OHLCV loader for CSV and parquet files.
//!
//! Files hold one row per bar with the columns:
//! - date (or timestamp): `YYYY-MM-DD`, a polars Date or Datetime, or
//!   integer Unix epoch seconds/milliseconds
//! - open, high, low, close, volume
//!
//! Rows must already be sorted ascending with no duplicate timestamps;
//! the resulting `PriceHistory` rejects anything else.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use polars::prelude::*;
use thiserror::Error;

use crate::error::CoreError;

use super::matrix::FeatureMatrix;
use super::types::{OhlcBar, PriceHistory};

/// Numeric columns every price file must carry.
pub const EXPECTED_COLUMNS: &[&str] = &["open", "high", "low", "close", "volume"];

/// Accepted names for the timestamp column, in lookup order.
pub const DATE_COLUMNS: &[&str] = &["date", "timestamp"];

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Malformed price history: {0}")]
    Malformed(#[from] CoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Data-access collaborator handed to batch jobs.
///
/// Implementations must be safe to call from several worker threads.
pub trait PriceSource: Send + Sync {
    fn load(&self, symbol: &str) -> Result<PriceHistory, LoaderError>;
}

/// File-backed price loader rooted at a data directory.
///
/// A symbol resolves to `{data_dir}/{symbol}.parquet`, falling back to
/// `{data_dir}/{symbol}.csv`.
pub struct PriceLoader {
    data_dir: PathBuf,
}

impl PriceLoader {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
        }
    }

    /// Locate the file backing a symbol.
    pub fn symbol_path(&self, symbol: &str) -> Result<PathBuf, LoaderError> {
        for ext in ["parquet", "csv"] {
            let path = self.data_dir.join(format!("{}.{}", symbol, ext));
            if path.exists() {
                return Ok(path);
            }
        }
        Err(LoaderError::FileNotFound(format!(
            "{}/{}.{{parquet,csv}}",
            self.data_dir.display(),
            symbol
        )))
    }

    /// List symbols with a price file in the data directory.
    pub fn available_symbols(&self) -> Result<Vec<String>, LoaderError> {
        if !self.data_dir.exists() {
            return Ok(vec![]);
        }

        let mut symbols = Vec::new();
        for entry in std::fs::read_dir(&self.data_dir)? {
            let path = entry?.path();
            let is_price_file = matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("parquet") | Some("csv")
            );
            if is_price_file {
                if let Some(stem) = path.file_stem() {
                    symbols.push(stem.to_string_lossy().to_string());
                }
            }
        }
        symbols.sort();
        symbols.dedup();
        Ok(symbols)
    }

    /// Load any CSV or parquet file as a `PriceHistory`.
    pub fn load_file(&self, path: &Path, symbol: &str) -> Result<PriceHistory, LoaderError> {
        let df = load_dataframe(path)?;
        dataframe_to_history(&df, symbol)
    }
}

impl PriceSource for PriceLoader {
    fn load(&self, symbol: &str) -> Result<PriceHistory, LoaderError> {
        let path = self.symbol_path(symbol)?;
        self.load_file(&path, symbol)
    }
}

/// Read a CSV or parquet file into a DataFrame.
pub fn load_dataframe(path: &Path) -> Result<DataFrame, LoaderError> {
    if !path.exists() {
        return Err(LoaderError::FileNotFound(path.display().to_string()));
    }

    let lf = match path.extension().and_then(|e| e.to_str()) {
        Some("parquet") => LazyFrame::scan_parquet(path, ScanArgsParquet::default())?,
        Some("csv") => LazyCsvReader::new(path).with_has_header(true).finish()?,
        other => {
            return Err(LoaderError::InvalidData(format!(
                "unsupported file extension {:?} for {}",
                other,
                path.display()
            )))
        }
    };

    Ok(lf.collect()?)
}

/// Convert a DataFrame with OHLCV columns to a validated `PriceHistory`.
pub fn dataframe_to_history(df: &DataFrame, symbol: &str) -> Result<PriceHistory, LoaderError> {
    let columns: Vec<String> = df
        .get_column_names()
        .into_iter()
        .map(|s| s.to_string())
        .collect();

    let missing: Vec<_> = EXPECTED_COLUMNS
        .iter()
        .filter(|c| !columns.iter().any(|have| have == *c))
        .collect();
    if !missing.is_empty() {
        return Err(LoaderError::InvalidData(format!(
            "{}: missing columns {:?}",
            symbol, missing
        )));
    }

    let date_name = DATE_COLUMNS
        .iter()
        .find(|c| columns.iter().any(|have| have == *c))
        .ok_or_else(|| LoaderError::InvalidData(format!("{}: no date/timestamp column", symbol)))?;

    let dates = parse_dates(df, date_name)?;
    let open = numeric_column(df, "open")?;
    let high = numeric_column(df, "high")?;
    let low = numeric_column(df, "low")?;
    let close = numeric_column(df, "close")?;
    let volume = numeric_column(df, "volume")?;

    let bars = (0..df.height())
        .map(|i| OhlcBar {
            date: dates[i],
            open: open[i],
            high: high[i],
            low: low[i],
            close: close[i],
            volume: volume[i],
        })
        .collect();

    Ok(PriceHistory::new(symbol, bars)?)
}

/// Load every numeric column of a CSV or parquet file as a feature matrix.
///
/// Date and text columns are skipped; nulls become NaN.
pub fn load_feature_table(path: &Path) -> Result<FeatureMatrix, LoaderError> {
    let df = load_dataframe(path)?;
    let names: Vec<String> = df
        .get_columns()
        .iter()
        .filter(|c| {
            matches!(
                c.dtype(),
                DataType::Float64
                    | DataType::Float32
                    | DataType::Int64
                    | DataType::Int32
                    | DataType::UInt64
                    | DataType::UInt32
            )
        })
        .map(|c| c.name().to_string())
        .collect();
    if names.is_empty() {
        return Err(LoaderError::InvalidData(format!(
            "{}: no numeric columns",
            path.display()
        )));
    }

    let columns = names
        .into_iter()
        .map(|name| {
            let values = numeric_column(&df, &name)?;
            Ok((name, values))
        })
        .collect::<Result<Vec<_>, LoaderError>>()?;

    Ok(FeatureMatrix::from_columns(columns)?)
}

/// Read a column as f64, mapping nulls to NaN.
fn numeric_column(df: &DataFrame, name: &str) -> Result<Vec<f64>, LoaderError> {
    let column = df.column(name)?.cast(&DataType::Float64)?;
    Ok(column
        .f64()?
        .into_iter()
        .map(|v| v.unwrap_or(f64::NAN))
        .collect())
}

/// Days between 0001-01-01 and 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i64 = 719_163;

const SECONDS_PER_DAY: i64 = 86_400;

/// Parse the timestamp column, whatever its storage type.
///
/// Date and Datetime columns are read from their physical values. Integer
/// columns are Unix epoch times whose unit (s, ms, us or ns) follows from
/// their magnitude. Anything else is parsed as `YYYY-MM-DD` text.
fn parse_dates(df: &DataFrame, name: &str) -> Result<Vec<NaiveDate>, LoaderError> {
    let column = df.column(name)?;
    match column.dtype() {
        DataType::Date => {
            let days = column.cast(&DataType::Int32)?;
            days.i32()?
                .into_iter()
                .enumerate()
                .map(|(i, v)| epoch_day(name, i, v.map(i64::from)))
                .collect()
        }
        DataType::Datetime(unit, _) => {
            let per_day = match unit {
                TimeUnit::Milliseconds => SECONDS_PER_DAY * 1_000,
                TimeUnit::Microseconds => SECONDS_PER_DAY * 1_000_000,
                TimeUnit::Nanoseconds => SECONDS_PER_DAY * 1_000_000_000,
            };
            let ticks = column.cast(&DataType::Int64)?;
            ticks
                .i64()?
                .into_iter()
                .enumerate()
                .map(|(i, v)| epoch_day(name, i, v.map(|t| t.div_euclid(per_day))))
                .collect()
        }
        DataType::Int64
        | DataType::Int32
        | DataType::UInt64
        | DataType::UInt32 => {
            let ticks = column.cast(&DataType::Int64)?;
            ticks
                .i64()?
                .into_iter()
                .enumerate()
                .map(|(i, v)| epoch_day(name, i, v.map(|t| t.div_euclid(epoch_ticks_per_day(t)))))
                .collect()
        }
        _ => {
            let text = column.cast(&DataType::String)?;
            text.str()?
                .into_iter()
                .enumerate()
                .map(|(i, value)| {
                    let raw = value.ok_or_else(|| {
                        LoaderError::InvalidData(format!("null {} at row {}", name, i))
                    })?;
                    let day = raw.get(..10).unwrap_or(raw);
                    NaiveDate::parse_from_str(day, "%Y-%m-%d").map_err(|e| {
                        LoaderError::InvalidData(format!(
                            "invalid {} '{}' at row {}: {}",
                            name, raw, i, e
                        ))
                    })
                })
                .collect()
        }
    }
}

/// Ticks per day for an integer epoch timestamp, inferred from its size.
fn epoch_ticks_per_day(ticks: i64) -> i64 {
    match ticks.unsigned_abs() {
        0..=99_999_999_999 => SECONDS_PER_DAY,
        100_000_000_000..=99_999_999_999_999 => SECONDS_PER_DAY * 1_000,
        100_000_000_000_000..=99_999_999_999_999_999 => SECONDS_PER_DAY * 1_000_000,
        _ => SECONDS_PER_DAY * 1_000_000_000,
    }
}

fn epoch_day(name: &str, row: usize, days: Option<i64>) -> Result<NaiveDate, LoaderError> {
    let days = days.ok_or_else(|| LoaderError::InvalidData(format!("null {} at row {}", name, row)))?;
    i32::try_from(days + UNIX_EPOCH_DAYS_FROM_CE)
        .ok()
        .and_then(NaiveDate::from_num_days_from_ce_opt)
        .ok_or_else(|| {
            LoaderError::InvalidData(format!("{} out of range at row {}: {} days", name, row, days))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_load_csv_history() {
        let dir = tempfile::tempdir().unwrap();
        write_csv(
            dir.path(),
            "SPY.csv",
            "date,open,high,low,close,volume\n\
             2024-01-02,100,101,99,100.5,1000\n\
             2024-01-03,100.5,102,100,101.5,1200\n\
             2024-01-04,101.5,103,101,102,900\n",
        );

        let loader = PriceLoader::new(dir.path());
        let history = loader.load("SPY").unwrap();

        assert_eq!(history.len(), 3);
        assert_eq!(history.symbol(), "SPY");
        assert_eq!(
            history.bars()[0].date,
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
        );
        assert!((history.bars()[2].close - 102.0).abs() < 1e-12);
    }

    #[test]
    fn test_missing_column_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_csv(
            dir.path(),
            "QQQ.csv",
            "date,open,high,low,close\n2024-01-02,100,101,99,100.5\n",
        );

        let loader = PriceLoader::new(dir.path());
        assert!(matches!(loader.load("QQQ"), Err(LoaderError::InvalidData(_))));
    }

    #[test]
    fn test_unsorted_file_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        write_csv(
            dir.path(),
            "IWM.csv",
            "timestamp,open,high,low,close,volume\n\
             2024-01-03,100,101,99,100.5,1000\n\
             2024-01-02,100.5,102,100,101.5,1200\n",
        );

        let loader = PriceLoader::new(dir.path());
        assert!(matches!(loader.load("IWM"), Err(LoaderError::Malformed(_))));
    }

    #[test]
    fn test_missing_symbol() {
        let dir = tempfile::tempdir().unwrap();
        let loader = PriceLoader::new(dir.path());
        assert!(matches!(loader.load("NOPE"), Err(LoaderError::FileNotFound(_))));
    }

    #[test]
    fn test_load_feature_table_skips_text_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(
            dir.path(),
            "features.csv",
            "date,return_1d,rsi_14,note\n\
             2024-01-02,0.01,55.5,a\n\
             2024-01-03,-0.02,48,b\n",
        );

        let table = load_feature_table(&path).unwrap();
        assert_eq!(table.names(), &["return_1d".to_string(), "rsi_14".to_string()]);
        assert_eq!(table.n_rows(), 2);
        assert!((table.column("rsi_14").unwrap()[1] - 48.0).abs() < 1e-12);
    }

    #[test]
    fn test_epoch_integer_timestamps() {
        let dir = tempfile::tempdir().unwrap();
        // seconds, then milliseconds
        write_csv(
            dir.path(),
            "DIA.csv",
            "timestamp,open,high,low,close,volume\n\
             1704153600,100,101,99,100.5,1000\n\
             1704240000000,100.5,102,100,101.5,1200\n",
        );

        let history = PriceLoader::new(dir.path()).load("DIA").unwrap();
        assert_eq!(history.bars()[0].date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(history.bars()[1].date, NaiveDate::from_ymd_opt(2024, 1, 3).unwrap());
    }

    #[test]
    fn test_datetime_and_date_columns() {
        let ticks = Series::new("date".into(), &[1_704_153_600_000i64, 1_704_240_000_000])
            .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
            .unwrap();
        let mut df = DataFrame::new(vec![
            Column::from(ticks),
            Column::new("open".into(), [100.0, 100.5]),
            Column::new("high".into(), [101.0, 102.0]),
            Column::new("low".into(), [99.0, 100.0]),
            Column::new("close".into(), [100.5, 101.5]),
            Column::new("volume".into(), [1000.0, 1200.0]),
        ])
        .unwrap();

        let history = dataframe_to_history(&df, "DT").unwrap();
        assert_eq!(history.bars()[1].date, NaiveDate::from_ymd_opt(2024, 1, 3).unwrap());

        let days = Series::new("date".into(), &[19_724i32, 19_725])
            .cast(&DataType::Date)
            .unwrap();
        df.with_column(days).unwrap();
        let history = dataframe_to_history(&df, "D").unwrap();
        assert_eq!(history.bars()[0].date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
    }

    #[test]
    fn test_available_symbols() {
        let dir = tempfile::tempdir().unwrap();
        write_csv(dir.path(), "B.csv", "x\n");
        write_csv(dir.path(), "A.csv", "x\n");
        write_csv(dir.path(), "notes.txt", "x\n");

        let loader = PriceLoader::new(dir.path());
        assert_eq!(loader.available_symbols().unwrap(), vec!["A", "B"]);
    }
}
