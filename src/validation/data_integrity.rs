//! Data integrity validation for OHLCV price histories.
//!
//! Validates the boundary contract with the data-acquisition side:
//! - Ordering (timestamps strictly ascending)
//! - No duplicate timestamps
//! - OHLC consistency (low <= open, close <= high)
//! - Price positivity and finite values
//! - Non-negative volume
//! - Date gaps (reported, never fatal)

use std::collections::HashSet;

use chrono::NaiveDate;

use crate::data::OhlcBar;

/// Calendar-day gap above which a warning is attached to the report.
const MAX_GAP_DAYS: i64 = 7;

/// Result of a single validation check.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    pub message: String,
    pub details: Option<String>,
}

impl CheckResult {
    pub fn pass(name: &str, message: &str) -> Self {
        Self {
            name: name.to_string(),
            passed: true,
            message: message.to_string(),
            details: None,
        }
    }

    pub fn fail(name: &str, message: &str, details: Option<String>) -> Self {
        Self {
            name: name.to_string(),
            passed: false,
            message: message.to_string(),
            details,
        }
    }
}

/// Complete integrity report for one symbol's bars.
#[derive(Debug)]
pub struct DataIntegrityReport {
    pub symbol: String,
    pub row_count: usize,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    pub checks: Vec<CheckResult>,
}

impl DataIntegrityReport {
    pub fn all_passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    pub fn failed_checks(&self) -> Vec<&CheckResult> {
        self.checks.iter().filter(|c| !c.passed).collect()
    }

    /// One line per failed check, for error messages.
    pub fn failure_details(&self) -> String {
        let failures: Vec<String> = self
            .failed_checks()
            .iter()
            .map(|c| match &c.details {
                Some(d) => format!("{}: {} ({})", c.name, c.message, d),
                None => format!("{}: {}", c.name, c.message),
            })
            .collect();
        format!("{}: {}", self.symbol, failures.join("; "))
    }

    pub fn summary(&self) -> String {
        let passed = self.checks.iter().filter(|c| c.passed).count();
        let total = self.checks.len();
        let range = match (self.first_date, self.last_date) {
            (Some(first), Some(last)) => format!("{} to {}", first, last),
            _ => "empty".to_string(),
        };
        format!(
            "{} ({} rows, {}): {}/{} checks passed",
            self.symbol, self.row_count, range, passed, total
        )
    }
}

/// Validator for OHLCV bars.
#[derive(Debug, Default)]
pub struct DataIntegrityValidator;

impl DataIntegrityValidator {
    pub fn new() -> Self {
        Self
    }

    /// Run all checks on a symbol's bars.
    pub fn validate(&self, symbol: &str, bars: &[OhlcBar]) -> DataIntegrityReport {
        let checks = vec![
            self.check_ordering(bars),
            self.check_duplicates(bars),
            self.check_finite_values(bars),
            self.check_price_positivity(bars),
            self.check_ohlc_consistency(bars),
            self.check_volume(bars),
            self.check_date_gaps(bars),
        ];

        DataIntegrityReport {
            symbol: symbol.to_string(),
            row_count: bars.len(),
            first_date: bars.first().map(|b| b.date),
            last_date: bars.last().map(|b| b.date),
            checks,
        }
    }

    /// Timestamps must never move backwards.
    fn check_ordering(&self, bars: &[OhlcBar]) -> CheckResult {
        let violations: Vec<String> = bars
            .windows(2)
            .filter(|w| w[1].date < w[0].date)
            .take(5)
            .map(|w| format!("{} -> {}", w[0].date, w[1].date))
            .collect();

        if violations.is_empty() {
            CheckResult::pass("ordering", "Timestamps ascending")
        } else {
            CheckResult::fail(
                "ordering",
                "Timestamps out of order",
                Some(violations.join(", ")),
            )
        }
    }

    fn check_duplicates(&self, bars: &[OhlcBar]) -> CheckResult {
        let mut seen = HashSet::with_capacity(bars.len());
        let duplicates: Vec<String> = bars
            .iter()
            .filter(|b| !seen.insert(b.date))
            .map(|b| b.date.to_string())
            .collect();

        if duplicates.is_empty() {
            CheckResult::pass("duplicate_timestamps", "No duplicate timestamps")
        } else {
            CheckResult::fail(
                "duplicate_timestamps",
                &format!("{} duplicate timestamps", duplicates.len()),
                Some(duplicates.into_iter().take(5).collect::<Vec<_>>().join(", ")),
            )
        }
    }

    fn check_finite_values(&self, bars: &[OhlcBar]) -> CheckResult {
        let bad = bars
            .iter()
            .filter(|b| {
                ![b.open, b.high, b.low, b.close, b.volume]
                    .iter()
                    .all(|v| v.is_finite())
            })
            .count();

        if bad == 0 {
            CheckResult::pass("finite_values", "All values finite")
        } else {
            CheckResult::fail(
                "finite_values",
                &format!("{} rows with NaN or infinite values", bad),
                None,
            )
        }
    }

    fn check_price_positivity(&self, bars: &[OhlcBar]) -> CheckResult {
        let bad = bars
            .iter()
            .filter(|b| [b.open, b.high, b.low, b.close].iter().any(|p| *p <= 0.0))
            .count();

        if bad == 0 {
            CheckResult::pass("price_positivity", "All prices positive")
        } else {
            CheckResult::fail(
                "price_positivity",
                &format!("{} rows with non-positive prices", bad),
                None,
            )
        }
    }

    /// low <= min(open, close) and max(open, close) <= high.
    fn check_ohlc_consistency(&self, bars: &[OhlcBar]) -> CheckResult {
        let tolerance = 1e-9;
        let violations: Vec<String> = bars
            .iter()
            .filter(|b| {
                b.low > b.high + tolerance
                    || b.open > b.high + tolerance
                    || b.close > b.high + tolerance
                    || b.open < b.low - tolerance
                    || b.close < b.low - tolerance
            })
            .map(|b| b.date.to_string())
            .collect();

        if violations.is_empty() {
            CheckResult::pass("ohlc_consistency", "All bars satisfy low <= open/close <= high")
        } else {
            CheckResult::fail(
                "ohlc_consistency",
                &format!("{} bars violate OHLC ordering", violations.len()),
                Some(violations.into_iter().take(5).collect::<Vec<_>>().join(", ")),
            )
        }
    }

    fn check_volume(&self, bars: &[OhlcBar]) -> CheckResult {
        let negative = bars.iter().filter(|b| b.volume < 0.0).count();
        if negative == 0 {
            CheckResult::pass("volume_non_negative", "Volume non-negative")
        } else {
            CheckResult::fail(
                "volume_non_negative",
                &format!("{} rows with negative volume", negative),
                None,
            )
        }
    }

    /// Large calendar gaps are common around halts and holidays, so they
    /// are reported without failing the check.
    fn check_date_gaps(&self, bars: &[OhlcBar]) -> CheckResult {
        let gaps: Vec<String> = bars
            .windows(2)
            .filter_map(|w| {
                let days = (w[1].date - w[0].date).num_days();
                (days > MAX_GAP_DAYS).then(|| format!("{} to {} ({} days)", w[0].date, w[1].date, days))
            })
            .collect();

        if gaps.is_empty() {
            CheckResult::pass("date_gaps", "No major gaps")
        } else {
            let mut result = CheckResult::pass(
                "date_gaps",
                &format!("{} gaps longer than {} days", gaps.len(), MAX_GAP_DAYS),
            );
            result.details = Some(gaps.join(", "));
            result
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(date: NaiveDate, close: f64) -> OhlcBar {
        OhlcBar {
            date,
            open: close,
            high: close * 1.01,
            low: close * 0.99,
            close,
            volume: 1_000.0,
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn test_check_result() {
        let pass = CheckResult::pass("test", "passed");
        assert!(pass.passed);

        let fail = CheckResult::fail("test", "failed", Some("details".to_string()));
        assert!(!fail.passed);
        assert_eq!(fail.details, Some("details".to_string()));
    }

    #[test]
    fn test_clean_history_passes() {
        let bars: Vec<_> = (1..=10).map(|d| bar(day(d), 100.0 + d as f64)).collect();
        let report = DataIntegrityValidator::new().validate("SPY", &bars);
        assert!(report.all_passed());
        assert!(report.summary().contains("7/7 checks passed"));
    }

    #[test]
    fn test_duplicate_and_order_detected() {
        let bars = vec![bar(day(2), 100.0), bar(day(2), 101.0), bar(day(1), 102.0)];
        let report = DataIntegrityValidator::new().validate("SPY", &bars);

        let failed: Vec<_> = report.failed_checks().iter().map(|c| c.name.clone()).collect();
        assert!(failed.contains(&"ordering".to_string()));
        assert!(failed.contains(&"duplicate_timestamps".to_string()));
        assert!(report.failure_details().starts_with("SPY: "));
    }

    #[test]
    fn test_ohlc_violation_detected() {
        let mut broken = bar(day(1), 100.0);
        broken.close = 120.0;
        let report = DataIntegrityValidator::new().validate("SPY", &[broken]);
        assert!(!report.all_passed());
        assert_eq!(report.failed_checks()[0].name, "ohlc_consistency");
    }

    #[test]
    fn test_gap_is_warning_only() {
        let bars = vec![bar(day(1), 100.0), bar(day(20), 101.0)];
        let report = DataIntegrityValidator::new().validate("SPY", &bars);
        assert!(report.all_passed());
        let gap = report.checks.iter().find(|c| c.name == "date_gaps").unwrap();
        assert!(gap.details.as_ref().unwrap().contains("19 days"));
    }

    #[test]
    fn test_nan_price_fails() {
        let mut b = bar(day(1), 100.0);
        b.open = f64::NAN;
        let report = DataIntegrityValidator::new().validate("SPY", &[b]);
        assert!(report
            .failed_checks()
            .iter()
            .any(|c| c.name == "finite_values"));
    }
}
