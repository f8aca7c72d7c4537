//! Feature construction.
//!
//! Every feature at row `i` uses bars `0..=i` only. Rows inside a warm-up
//! window are NaN and get dropped by `FeatureMatrix::retain_finite`.

use serde::{Deserialize, Serialize};

use crate::data::{FeatureMatrix, PriceHistory};
use crate::error::CoreResult;
use crate::stats::{rolling_mean, rolling_std};

/// Window lengths for the built features.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub short_return: usize,
    pub long_return: usize,
    pub volatility_window: usize,
    pub atr_period: usize,
    pub rsi_period: usize,
    pub sma_window: usize,
    pub volume_window: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            short_return: 5,
            long_return: 20,
            volatility_window: 20,
            atr_period: 14,
            rsi_period: 14,
            sma_window: 20,
            volume_window: 20,
        }
    }
}

/// Builds the feature matrix for one symbol.
#[derive(Debug, Clone, Default)]
pub struct FeatureBuilder {
    config: FeatureConfig,
}

impl FeatureBuilder {
    pub fn new(config: FeatureConfig) -> Self {
        Self { config }
    }

    /// Column names in output order.
    pub fn feature_names(&self) -> Vec<String> {
        let c = &self.config;
        vec![
            "return_1d".to_string(),
            format!("return_{}d", c.short_return),
            format!("return_{}d", c.long_return),
            format!("volatility_{}d", c.volatility_window),
            format!("atr_pct_{}", c.atr_period),
            format!("rsi_{}", c.rsi_period),
            format!("sma_ratio_{}", c.sma_window),
            format!("volume_ratio_{}", c.volume_window),
            "range_pct".to_string(),
        ]
    }

    /// Longest lookback of any feature, in bars.
    pub fn max_lookback(&self) -> usize {
        let c = &self.config;
        [
            c.short_return,
            c.long_return,
            c.volatility_window + 1,
            c.atr_period + 1,
            c.rsi_period + 1,
            c.sma_window,
            c.volume_window,
        ]
        .into_iter()
        .max()
        .unwrap_or(1)
    }

    pub fn build(&self, history: &PriceHistory) -> CoreResult<FeatureMatrix> {
        let c = &self.config;
        let bars = history.bars();
        let closes = history.closes();
        let volumes: Vec<f64> = bars.iter().map(|b| b.volume).collect();

        let mut one_day = vec![f64::NAN; closes.len()];
        for i in 1..closes.len() {
            one_day[i] = closes[i] / closes[i - 1] - 1.0;
        }

        let vol = rolling_std(&one_day, c.volatility_window);

        let true_ranges: Vec<f64> = bars
            .iter()
            .enumerate()
            .map(|(i, b)| b.true_range(i.checked_sub(1).map(|p| bars[p].close)))
            .collect();
        let atr = rolling_mean(&true_ranges, c.atr_period);
        let atr_pct: Vec<f64> = atr
            .iter()
            .zip(&closes)
            .enumerate()
            .map(|(i, (a, close))| if i < c.atr_period { f64::NAN } else { a / close })
            .collect();

        let sma = rolling_mean(&closes, c.sma_window);
        let sma_ratio: Vec<f64> = closes.iter().zip(&sma).map(|(p, s)| p / s - 1.0).collect();

        let avg_volume = rolling_mean(&volumes, c.volume_window);
        let volume_ratio: Vec<f64> = volumes
            .iter()
            .zip(&avg_volume)
            .map(|(v, avg)| if *avg > 0.0 { v / avg } else { f64::NAN })
            .collect();

        let range_pct: Vec<f64> = bars.iter().map(|b| (b.high - b.low) / b.close).collect();

        let columns = self
            .feature_names()
            .into_iter()
            .zip([
                one_day,
                lagged_return(&closes, c.short_return),
                lagged_return(&closes, c.long_return),
                vol,
                atr_pct,
                rsi(&closes, c.rsi_period),
                sma_ratio,
                volume_ratio,
                range_pct,
            ])
            .collect();

        FeatureMatrix::from_columns(columns)
    }
}

fn lagged_return(closes: &[f64], lag: usize) -> Vec<f64> {
    (0..closes.len())
        .map(|i| {
            if lag == 0 || i < lag {
                f64::NAN
            } else {
                closes[i] / closes[i - lag] - 1.0
            }
        })
        .collect()
}

/// Simple-average RSI over `period` close-to-close changes.
fn rsi(closes: &[f64], period: usize) -> Vec<f64> {
    (0..closes.len())
        .map(|i| {
            if period == 0 || i < period {
                return f64::NAN;
            }
            let (gain, loss) = closes[i - period..=i]
                .windows(2)
                .map(|w| w[1] - w[0])
                .fold((0.0, 0.0), |(g, l), d| {
                    if d > 0.0 {
                        (g + d, l)
                    } else {
                        (g, l - d)
                    }
                });
            if gain + loss == 0.0 {
                50.0
            } else {
                100.0 * gain / (gain + loss)
            }
        })
        .collect()
}
