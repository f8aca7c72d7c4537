//! Volatility regime classifier.
//!
//! Compares current realized volatility against the history's own baseline.

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use crate::stats::{rolling_std, sample_std};

/// Volatility regime relative to the symbol's own history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VolatilityRegime {
    /// Current vol well below baseline.
    Low,
    /// Current vol near baseline.
    Normal,
    /// Current vol well above baseline.
    High,
}

impl VolatilityRegime {
    /// Description of the regime.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Low => "Compressed volatility, thresholds narrow",
            Self::Normal => "Volatility near its baseline",
            Self::High => "Elevated volatility, thresholds widen",
        }
    }
}

/// Regime classifier configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegimeClassifierConfig {
    /// Rolling window for realized volatility (bars).
    pub window: usize,
    /// Ratio below which the regime is Low.
    pub low_ratio: f64,
    /// Ratio above which the regime is High.
    pub high_ratio: f64,
}

impl Default for RegimeClassifierConfig {
    fn default() -> Self {
        Self {
            window: 20,
            low_ratio: 0.75,
            high_ratio: 1.5,
        }
    }
}

/// One regime reading over a close series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegimeReading {
    pub regime: VolatilityRegime,
    /// Sample std of the trailing window of simple returns.
    pub current_vol: f64,
    /// Mean of the rolling vol series over the whole history.
    pub baseline_vol: f64,
    /// current / baseline, 1.0 when the baseline is degenerate.
    pub vol_ratio: f64,
}

/// Volatility regime classifier.
#[derive(Debug, Clone, Default)]
pub struct RegimeClassifier {
    config: RegimeClassifierConfig,
}

impl RegimeClassifier {
    pub fn new(config: RegimeClassifierConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RegimeClassifierConfig {
        &self.config
    }

    /// Classify the latest regime. `None` when fewer than `window + 1`
    /// closes are available.
    pub fn classify(&self, closes: &[f64]) -> Option<RegimeReading> {
        let window = self.config.window.max(2);
        if closes.len() < window + 1 {
            return None;
        }

        let returns: Vec<f64> = closes.windows(2).map(|w| w[1] / w[0] - 1.0).collect();
        let current_vol = sample_std(&returns[returns.len() - window..])?;

        let rolling: Vec<f64> = rolling_std(&returns, window)
            .into_iter()
            .filter(|v| v.is_finite())
            .collect();
        let baseline_vol = if rolling.is_empty() {
            current_vol
        } else {
            rolling.iter().mean()
        };

        let vol_ratio = if baseline_vol > 0.0 && baseline_vol.is_finite() {
            current_vol / baseline_vol
        } else {
            1.0
        };

        Some(RegimeReading {
            regime: self.regime_for_ratio(vol_ratio),
            current_vol,
            baseline_vol,
            vol_ratio,
        })
    }

    fn regime_for_ratio(&self, ratio: f64) -> VolatilityRegime {
        if ratio < self.config.low_ratio {
            VolatilityRegime::Low
        } else if ratio > self.config.high_ratio {
            VolatilityRegime::High
        } else {
            VolatilityRegime::Normal
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Alternating returns of +amp / -amp.
    fn zigzag(n: usize, amp: f64, start: f64) -> Vec<f64> {
        let mut closes = vec![start];
        for i in 0..n {
            let last = *closes.last().unwrap();
            let r = if i % 2 == 0 { amp } else { -amp };
            closes.push(last * (1.0 + r));
        }
        closes
    }

    #[test]
    fn test_requires_window_plus_one() {
        let classifier = RegimeClassifier::default();
        assert!(classifier.classify(&zigzag(19, 0.01, 100.0)).is_none());
        assert!(classifier.classify(&zigzag(20, 0.01, 100.0)).is_some());
    }

    #[test]
    fn test_constant_vol_is_normal() {
        let reading = RegimeClassifier::default()
            .classify(&zigzag(200, 0.01, 100.0))
            .unwrap();
        assert_eq!(reading.regime, VolatilityRegime::Normal);
        assert!((reading.vol_ratio - 1.0).abs() < 0.05);
    }

    #[test]
    fn test_vol_spike_is_high() {
        let mut closes = zigzag(200, 0.005, 100.0);
        let last = *closes.last().unwrap();
        closes.extend(zigzag(20, 0.04, last).into_iter().skip(1));

        let reading = RegimeClassifier::default().classify(&closes).unwrap();
        assert_eq!(reading.regime, VolatilityRegime::High);
        assert!(reading.vol_ratio > 1.5);
    }

    #[test]
    fn test_vol_compression_is_low() {
        let mut closes = zigzag(200, 0.03, 100.0);
        let last = *closes.last().unwrap();
        closes.extend(zigzag(20, 0.002, last).into_iter().skip(1));

        let reading = RegimeClassifier::default().classify(&closes).unwrap();
        assert_eq!(reading.regime, VolatilityRegime::Low);
    }

    #[test]
    fn test_flat_prices_fall_back_to_unit_ratio() {
        let reading = RegimeClassifier::default().classify(&[100.0; 40]).unwrap();
        assert_eq!(reading.vol_ratio, 1.0);
        assert_eq!(reading.regime, VolatilityRegime::Normal);
    }
}
