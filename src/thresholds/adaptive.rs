//! Adaptive classification thresholds.
//!
//! Three strategies tried in order for a given horizon:
//! 1. Percentile of forward returns (balanced 3-class labels)
//! 2. ATR / price, scaled by sqrt(horizon)
//! 3. Fixed base threshold scaled by the volatility ratio and sqrt(horizon)

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::data::{Label, PriceHistory};
use crate::error::{CoreError, CoreResult};
use crate::regime::{RegimeClassifier, RegimeClassifierConfig, VolatilityRegime};
use crate::stats::quantile_sorted;

/// Strategy that produced a threshold pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ThresholdSource {
    Percentile,
    Atr,
    VolatilityRatio,
}

impl ThresholdSource {
    /// Fallback order for horizon-aware thresholds.
    pub const CHAIN: [ThresholdSource; 3] = [
        ThresholdSource::Percentile,
        ThresholdSource::Atr,
        ThresholdSource::VolatilityRatio,
    ];
}

/// Return thresholds for one forecast horizon. `bearish <= 0 <= bullish`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdPair {
    pub bearish: f64,
    pub bullish: f64,
    pub horizon_days: usize,
    pub source: ThresholdSource,
    pub regime: Option<VolatilityRegime>,
    /// Set when the pair was widened to cover a shorter horizon's pair.
    pub widened: bool,
}

impl ThresholdPair {
    /// Symmetric pair around zero.
    fn symmetric(width: f64, horizon_days: usize, source: ThresholdSource) -> Self {
        Self {
            bearish: -width.abs(),
            bullish: width.abs(),
            horizon_days,
            source,
            regime: None,
            widened: false,
        }
    }

    /// Three-class label for a forward return.
    pub fn classify(&self, forward_return: f64) -> Label {
        if forward_return > self.bullish {
            Label::Bullish
        } else if forward_return < self.bearish {
            Label::Bearish
        } else {
            Label::Neutral
        }
    }
}

/// Threshold configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Base ±threshold scaled by the volatility ratio.
    pub base_threshold: f64,
    /// Rolling window for the volatility ratio.
    pub vol_window: usize,
    pub atr_period: usize,
    pub atr_multiplier: f64,
    /// Percentiles in [0, 100].
    pub bearish_percentile: f64,
    pub bullish_percentile: f64,
    /// Minimum forward-return samples for percentile thresholds.
    pub min_percentile_samples: usize,
    /// Widen each horizon's pair to the envelope of all shorter horizons.
    pub enforce_horizon_monotonicity: bool,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            base_threshold: 0.02,
            vol_window: 20,
            atr_period: 14,
            atr_multiplier: 1.0,
            bearish_percentile: 35.0,
            bullish_percentile: 65.0,
            min_percentile_samples: 30,
            enforce_horizon_monotonicity: true,
        }
    }
}

/// Maps a price history to threshold pairs.
#[derive(Debug, Clone)]
pub struct AdaptiveThresholds {
    config: ThresholdConfig,
    regime: RegimeClassifier,
}

impl Default for AdaptiveThresholds {
    fn default() -> Self {
        Self::new(ThresholdConfig::default())
    }
}

impl AdaptiveThresholds {
    pub fn new(config: ThresholdConfig) -> Self {
        let regime = RegimeClassifier::new(RegimeClassifierConfig {
            window: config.vol_window,
            ..RegimeClassifierConfig::default()
        });
        Self { config, regime }
    }

    pub fn config(&self) -> &ThresholdConfig {
        &self.config
    }

    /// ±base threshold scaled by current / baseline volatility.
    pub fn compute_volatility(&self, history: &PriceHistory) -> CoreResult<ThresholdPair> {
        let reading = self.regime.classify(&history.closes()).ok_or_else(|| {
            CoreError::insufficient(
                "volatility-ratio thresholds",
                self.config.vol_window + 1,
                history.len(),
            )
        })?;

        let width = self.config.base_threshold * reading.vol_ratio;
        let mut pair = ThresholdPair::symmetric(width, 1, ThresholdSource::VolatilityRatio);
        pair.regime = Some(reading.regime);
        Ok(pair)
    }

    /// ±(ATR / price × multiplier), ATR being the mean true range over
    /// the last `atr_period` bars.
    pub fn compute_atr(&self, history: &PriceHistory) -> CoreResult<ThresholdPair> {
        let period = self.config.atr_period.max(1);
        let bars = history.bars();
        if bars.len() < period + 1 {
            return Err(CoreError::insufficient(
                "ATR thresholds",
                period + 1,
                bars.len(),
            ));
        }

        let start = bars.len() - period;
        let atr = (start..bars.len())
            .map(|i| bars[i].true_range(Some(bars[i - 1].close)))
            .sum::<f64>()
            / period as f64;
        let price = bars[bars.len() - 1].close;
        let width = atr / price * self.config.atr_multiplier;

        if !width.is_finite() || width <= 0.0 {
            return Err(CoreError::Numerical(format!(
                "ATR unavailable (atr={:.6}, price={:.4})",
                atr, price
            )));
        }

        let mut pair = ThresholdPair::symmetric(width, 1, ThresholdSource::Atr);
        pair.regime = self.current_regime(history);
        Ok(pair)
    }

    /// Configured percentiles of the `horizon_days` forward returns,
    /// clamped so that `bearish <= 0 <= bullish`.
    pub fn compute_percentile(
        &self,
        history: &PriceHistory,
        horizon_days: usize,
    ) -> CoreResult<ThresholdPair> {
        let mut forward: Vec<f64> = history
            .forward_returns(horizon_days.max(1))
            .into_iter()
            .filter(|r| r.is_finite())
            .collect();

        if forward.len() < self.config.min_percentile_samples {
            return Err(CoreError::insufficient(
                format!("percentile thresholds (h={})", horizon_days),
                self.config.min_percentile_samples,
                forward.len(),
            ));
        }

        forward.sort_by(|a, b| a.total_cmp(b));
        let lower = quantile_sorted(&forward, self.config.bearish_percentile / 100.0);
        let upper = quantile_sorted(&forward, self.config.bullish_percentile / 100.0);
        let (Some(lower), Some(upper)) = (lower, upper) else {
            return Err(CoreError::insufficient("percentile thresholds", 1, 0));
        };

        Ok(ThresholdPair {
            bearish: lower.min(0.0),
            bullish: upper.max(0.0),
            horizon_days,
            source: ThresholdSource::Percentile,
            regime: self.current_regime(history),
            widened: false,
        })
    }

    /// Horizon-aware thresholds: percentile, then ATR × sqrt(h), then
    /// volatility ratio × sqrt(h). With monotonicity enforced, the result
    /// also covers every shorter horizon's pair.
    pub fn compute_thresholds_horizon(
        &self,
        history: &PriceHistory,
        horizon_days: usize,
    ) -> CoreResult<ThresholdPair> {
        let horizon_days = horizon_days.max(1);
        let mut pair = self.raw_horizon(history, horizon_days)?;

        if self.config.enforce_horizon_monotonicity {
            for shorter in 1..horizon_days {
                let other = self.raw_horizon(history, shorter)?;
                if other.bearish < pair.bearish {
                    pair.bearish = other.bearish;
                    pair.widened = true;
                }
                if other.bullish > pair.bullish {
                    pair.bullish = other.bullish;
                    pair.widened = true;
                }
            }
        }

        info!(
            symbol = history.symbol(),
            horizon = horizon_days,
            source = ?pair.source,
            bearish = pair.bearish,
            bullish = pair.bullish,
            widened = pair.widened,
            "Thresholds computed"
        );
        Ok(pair)
    }

    /// Pairs for horizons `1..=max_horizon`.
    pub fn horizon_table(
        &self,
        history: &PriceHistory,
        max_horizon: usize,
    ) -> CoreResult<Vec<ThresholdPair>> {
        (1..=max_horizon.max(1))
            .map(|h| self.compute_thresholds_horizon(history, h))
            .collect()
    }

    fn raw_horizon(&self, history: &PriceHistory, horizon_days: usize) -> CoreResult<ThresholdPair> {
        let scale = (horizon_days as f64).sqrt();
        let mut last_err = None;

        for source in ThresholdSource::CHAIN {
            let attempt = match source {
                ThresholdSource::Percentile => self.compute_percentile(history, horizon_days),
                ThresholdSource::Atr => self
                    .compute_atr(history)
                    .map(|p| scaled(p, scale, horizon_days)),
                ThresholdSource::VolatilityRatio => self
                    .compute_volatility(history)
                    .map(|p| scaled(p, scale, horizon_days)),
            };

            match attempt {
                Ok(pair) => return Ok(pair),
                Err(e) if falls_through(&e) => {
                    debug!(horizon = horizon_days, source = ?source, error = %e, "Threshold strategy unavailable");
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_err.unwrap_or_else(|| CoreError::insufficient("thresholds", 1, 0)))
    }

    fn current_regime(&self, history: &PriceHistory) -> Option<VolatilityRegime> {
        self.regime.classify(&history.closes()).map(|r| r.regime)
    }
}

fn scaled(pair: ThresholdPair, scale: f64, horizon_days: usize) -> ThresholdPair {
    ThresholdPair {
        bearish: pair.bearish * scale,
        bullish: pair.bullish * scale,
        horizon_days,
        ..pair
    }
}

fn falls_through(err: &CoreError) -> bool {
    matches!(
        err,
        CoreError::InsufficientData { .. } | CoreError::Numerical(_)
    )
}
