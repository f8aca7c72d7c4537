//! Purged walk-forward fold generation.
//!
//! Splits `n` time-ordered samples into `n_splits` contiguous test blocks
//! of `n / n_splits` rows (the last block absorbs the remainder). Training
//! rows that could leak test information are removed:
//! - purge: `purge_bars` rows immediately before the test block, whose
//!   forward label window overlaps it
//! - embargo: rows immediately after the test block, by row count
//!   (`split`) or by calendar days (`split_with_dates`)

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CoreError, CoreResult};

/// Which rows are eligible for training before purge and embargo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SplitMode {
    /// Only rows before the test block (expanding window).
    #[default]
    WalkForward,
    /// Every row outside the test block.
    PurgedKFold,
}

/// Cross-validation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CvConfig {
    pub n_splits: usize,
    /// Rows (or calendar days, for date splits) embargoed after each test block.
    pub embargo_days: usize,
    /// Rows purged before each test block.
    pub purge_bars: usize,
    pub mode: SplitMode,
    /// Minimum rows a fold needs to train.
    pub min_train_samples: usize,
    /// Cap on training rows in walk-forward mode (most recent kept).
    pub max_train_size: Option<usize>,
}

impl Default for CvConfig {
    fn default() -> Self {
        Self {
            n_splits: 5,
            embargo_days: 20,
            purge_bars: 0,
            mode: SplitMode::WalkForward,
            min_train_samples: 50,
            max_train_size: None,
        }
    }
}

/// One train/test split. Indices are ascending and disjoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fold {
    /// 1-based.
    pub fold_id: usize,
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
    /// Training rows removed by the purge.
    pub purged: usize,
    /// Training rows removed by the embargo.
    pub embargoed: usize,
}

impl Fold {
    pub fn train_size(&self) -> usize {
        self.train_indices.len()
    }

    pub fn test_size(&self) -> usize {
        self.test_indices.len()
    }

    /// First and last test index.
    pub fn test_range(&self) -> Option<(usize, usize)> {
        Some((*self.test_indices.first()?, *self.test_indices.last()?))
    }
}

/// Fold generator.
#[derive(Debug, Clone, Default)]
pub struct PurgedWalkForwardCV {
    config: CvConfig,
}

impl PurgedWalkForwardCV {
    pub fn new(config: CvConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CvConfig {
        &self.config
    }

    /// Folds with a row-count embargo.
    pub fn split(&self, n_samples: usize) -> CoreResult<Vec<Fold>> {
        let embargo = self.config.embargo_days;
        self.build_folds(n_samples, |_, test_end, i| {
            i > test_end && i <= test_end + embargo
        })
    }

    /// Folds with a calendar embargo: training rows dated within
    /// `[test start, last test date + embargo_days]` are excluded.
    pub fn split_with_dates(&self, dates: &[NaiveDate], n_samples: usize) -> CoreResult<Vec<Fold>> {
        if dates.len() != n_samples {
            return Err(CoreError::length_mismatch(
                "date sequence",
                n_samples,
                dates.len(),
            ));
        }
        let embargo = Duration::days(self.config.embargo_days as i64);
        self.build_folds(n_samples, |test_start, test_end, i| {
            let window_start = dates[test_start];
            let cutoff = dates[test_end] + embargo;
            dates[i] >= window_start && dates[i] <= cutoff
        })
    }

    fn build_folds(
        &self,
        n_samples: usize,
        embargoed: impl Fn(usize, usize, usize) -> bool,
    ) -> CoreResult<Vec<Fold>> {
        let n_splits = self.config.n_splits;
        if n_splits < 2 {
            return Err(CoreError::MalformedInput(format!(
                "n_splits must be at least 2, got {}",
                n_splits
            )));
        }
        if n_samples < n_splits {
            return Err(CoreError::insufficient("cross-validation folds", n_splits, n_samples));
        }

        let fold_size = n_samples / n_splits;
        let mut folds = Vec::with_capacity(n_splits);

        for k in 0..n_splits {
            let test_start = k * fold_size;
            let test_end = if k + 1 == n_splits {
                n_samples - 1
            } else {
                (k + 1) * fold_size - 1
            };
            let purge_start = test_start.saturating_sub(self.config.purge_bars);

            let candidates: Vec<usize> = match self.config.mode {
                SplitMode::WalkForward => (0..test_start).collect(),
                SplitMode::PurgedKFold => (0..n_samples)
                    .filter(|&i| i < test_start || i > test_end)
                    .collect(),
            };

            let mut purged = 0;
            let mut embargo_count = 0;
            let mut train_indices = Vec::with_capacity(candidates.len());
            for i in candidates {
                if i >= purge_start && i < test_start {
                    purged += 1;
                } else if embargoed(test_start, test_end, i) {
                    embargo_count += 1;
                } else {
                    train_indices.push(i);
                }
            }

            if self.config.mode == SplitMode::WalkForward {
                if let Some(cap) = self.config.max_train_size {
                    if train_indices.len() > cap {
                        train_indices.drain(..train_indices.len() - cap);
                    }
                }
            }

            debug!(
                fold = k + 1,
                train = train_indices.len(),
                test = test_end - test_start + 1,
                purged,
                embargoed = embargo_count,
                "Fold generated"
            );

            folds.push(Fold {
                fold_id: k + 1,
                train_indices,
                test_indices: (test_start..=test_end).collect(),
                purged,
                embargoed: embargo_count,
            });
        }

        Ok(folds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cv(mode: SplitMode, purge: usize) -> PurgedWalkForwardCV {
        PurgedWalkForwardCV::new(CvConfig {
            mode,
            purge_bars: purge,
            ..CvConfig::default()
        })
    }

    fn assert_disjoint(fold: &Fold) {
        for i in &fold.test_indices {
            assert!(!fold.train_indices.contains(i));
        }
    }

    #[test]
    fn test_five_hundred_rows_walk_forward() {
        let folds = cv(SplitMode::WalkForward, 0).split(500).unwrap();
        assert_eq!(folds.len(), 5);
        for fold in &folds {
            assert_eq!(fold.test_size(), 100);
            assert_disjoint(fold);
        }
        assert_eq!(folds[0].train_size(), 0);
        assert_eq!(folds[4].train_size(), 400);
        assert_eq!(folds[4].embargoed, 0);
    }

    #[test]
    fn test_purged_kfold_embargo() {
        let folds = cv(SplitMode::PurgedKFold, 0).split(500).unwrap();

        // fold 1: rows 100..120 embargoed
        assert_eq!(folds[0].embargoed, 20);
        assert_eq!(folds[0].train_indices[0], 120);
        assert_eq!(folds[0].train_size(), 380);

        // last fold has nothing after it
        assert_eq!(folds[4].embargoed, 0);
        assert_eq!(folds[4].train_size(), 400);

        for fold in &folds {
            assert_disjoint(fold);
            let (_, end) = fold.test_range().unwrap();
            assert!(fold
                .train_indices
                .iter()
                .all(|&i| i <= end || i > end + 20));
        }
    }

    #[test]
    fn test_purge_before_test_block() {
        let folds = cv(SplitMode::WalkForward, 5).split(500).unwrap();
        assert_eq!(folds[1].purged, 5);
        assert_eq!(folds[1].train_size(), 95);
        assert_eq!(*folds[1].train_indices.last().unwrap(), 94);
    }

    #[test]
    fn test_last_fold_absorbs_remainder() {
        let folds = cv(SplitMode::WalkForward, 0).split(503).unwrap();
        assert_eq!(folds[4].test_size(), 103);
        assert_eq!(folds[3].test_size(), 100);
    }

    #[test]
    fn test_max_train_size() {
        let cv = PurgedWalkForwardCV::new(CvConfig {
            max_train_size: Some(150),
            ..CvConfig::default()
        });
        let folds = cv.split(500).unwrap();
        assert_eq!(folds[4].train_size(), 150);
        assert_eq!(folds[4].train_indices[0], 250);
    }

    #[test]
    fn test_too_few_samples() {
        assert!(cv(SplitMode::WalkForward, 0).split(3).unwrap_err().is_insufficient_data());
    }

    #[test]
    fn test_date_embargo_uses_calendar_days() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        // business-day-like spacing: one row every 2 days
        let dates: Vec<NaiveDate> = (0..100).map(|i| start + Duration::days(2 * i)).collect();
        let cv = PurgedWalkForwardCV::new(CvConfig {
            mode: SplitMode::PurgedKFold,
            embargo_days: 10,
            ..CvConfig::default()
        });
        let folds = cv.split_with_dates(&dates, 100).unwrap();

        // test block 0..=19, last test date + 10 days covers rows 20..=24
        assert_eq!(folds[0].embargoed, 5);
        assert_eq!(folds[0].train_indices[0], 25);
        for fold in &folds {
            assert_disjoint(fold);
        }
    }

    #[test]
    fn test_date_length_mismatch() {
        let dates = vec![NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(); 10];
        let err = PurgedWalkForwardCV::default()
            .split_with_dates(&dates, 12)
            .unwrap_err();
        assert!(matches!(err, CoreError::LengthMismatch { .. }));
    }
}
