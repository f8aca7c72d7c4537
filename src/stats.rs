//! Small numeric helpers shared by the threshold, regime and feature code.

use statrs::statistics::Statistics;

/// Quantile of already-sorted data with linear interpolation between
/// order statistics. `q` is in [0, 1].
pub fn quantile_sorted(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let q = q.clamp(0.0, 1.0);
    let pos = q * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * frac)
}

/// Quantile of unsorted data; non-finite values are ignored.
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    sorted.sort_by(|a, b| a.total_cmp(b));
    quantile_sorted(&sorted, q)
}

/// Sample standard deviation (n - 1). `None` below two observations.
pub fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let std = values.std_dev();
    std.is_finite().then_some(std)
}

/// Trailing rolling sample standard deviation; the first `window - 1`
/// entries are NaN.
pub fn rolling_std(values: &[f64], window: usize) -> Vec<f64> {
    rolling(values, window, |w| sample_std(w).unwrap_or(f64::NAN))
}

/// Trailing rolling mean; the first `window - 1` entries are NaN.
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    rolling(values, window, |w| w.mean())
}

fn rolling(values: &[f64], window: usize, f: impl Fn(&[f64]) -> f64) -> Vec<f64> {
    if window == 0 {
        return vec![f64::NAN; values.len()];
    }
    (0..values.len())
        .map(|i| {
            if i + 1 < window {
                f64::NAN
            } else {
                f(&values[i + 1 - window..=i])
            }
        })
        .collect()
}
