//! Row-oriented feature matrix aligned with a label series.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

use super::types::Label;

/// Time-ordered rows of named numeric features.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureMatrix {
    names: Vec<String>,
    rows: Vec<Vec<f64>>,
}

impl FeatureMatrix {
    pub fn new(names: Vec<String>, rows: Vec<Vec<f64>>) -> CoreResult<Self> {
        for (i, row) in rows.iter().enumerate() {
            if row.len() != names.len() {
                return Err(CoreError::length_mismatch(
                    format!("feature row {}", i),
                    names.len(),
                    row.len(),
                ));
            }
        }
        Ok(Self { names, rows })
    }

    /// Build from named columns of equal length.
    pub fn from_columns(columns: Vec<(String, Vec<f64>)>) -> CoreResult<Self> {
        let n_rows = columns.first().map(|(_, c)| c.len()).unwrap_or(0);
        for (name, col) in &columns {
            if col.len() != n_rows {
                return Err(CoreError::length_mismatch(
                    format!("feature column '{}'", name),
                    n_rows,
                    col.len(),
                ));
            }
        }

        let rows = (0..n_rows)
            .map(|i| columns.iter().map(|(_, col)| col[i]).collect())
            .collect();
        let names = columns.into_iter().map(|(name, _)| name).collect();

        Ok(Self { names, rows })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> Option<&[f64]> {
        self.rows.get(index).map(|r| r.as_slice())
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_features(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|r| r[idx]).collect())
    }

    /// Copy the given rows, in the given order.
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            names: self.names.clone(),
            rows: indices
                .iter()
                .filter_map(|&i| self.rows.get(i).cloned())
                .collect(),
        }
    }

    /// Contiguous row range `[start, end)`.
    pub fn slice(&self, start: usize, end: usize) -> Self {
        let end = end.min(self.rows.len());
        let start = start.min(end);
        Self {
            names: self.names.clone(),
            rows: self.rows[start..end].to_vec(),
        }
    }

    /// Drop rows with any non-finite value, keeping `labels` aligned.
    ///
    /// Returns the kept original row indices.
    pub fn retain_finite(&mut self, labels: &mut Vec<Label>) -> CoreResult<Vec<usize>> {
        if labels.len() != self.rows.len() {
            return Err(CoreError::length_mismatch(
                "label series",
                self.rows.len(),
                labels.len(),
            ));
        }

        let kept: Vec<usize> = self
            .rows
            .iter()
            .enumerate()
            .filter(|(_, row)| row.iter().all(|v| v.is_finite()))
            .map(|(i, _)| i)
            .collect();

        self.rows = kept.iter().map(|&i| self.rows[i].clone()).collect();
        *labels = kept.iter().map(|&i| labels[i]).collect();

        Ok(kept)
    }

    /// Fail if any value is NaN or infinite.
    pub fn ensure_finite(&self) -> CoreResult<()> {
        for (i, row) in self.rows.iter().enumerate() {
            if let Some(j) = row.iter().position(|v| !v.is_finite()) {
                return Err(CoreError::MalformedInput(format!(
                    "non-finite value in feature '{}' at row {}",
                    self.names[j], i
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FeatureMatrix {
        FeatureMatrix::from_columns(vec![
            ("a".to_string(), vec![1.0, f64::NAN, 3.0, 4.0]),
            ("b".to_string(), vec![10.0, 20.0, f64::INFINITY, 40.0]),
        ])
        .unwrap()
    }

    #[test]
    fn test_from_columns_layout() {
        let m = sample();
        assert_eq!(m.n_rows(), 4);
        assert_eq!(m.n_features(), 2);
        assert_eq!(m.row(3), Some(&[4.0, 40.0][..]));
        assert_eq!(m.column("b").unwrap()[0], 10.0);
    }

    #[test]
    fn test_from_columns_rejects_ragged() {
        let result = FeatureMatrix::from_columns(vec![
            ("a".to_string(), vec![1.0, 2.0]),
            ("b".to_string(), vec![1.0]),
        ]);
        assert!(matches!(result, Err(CoreError::LengthMismatch { .. })));
    }

    #[test]
    fn test_retain_finite_keeps_labels_aligned() {
        let mut m = sample();
        let mut labels = vec![Label::Bullish, Label::Neutral, Label::Bearish, Label::Neutral];
        let kept = m.retain_finite(&mut labels).unwrap();

        assert_eq!(kept, vec![0, 3]);
        assert_eq!(labels, vec![Label::Bullish, Label::Neutral]);
        assert!(m.ensure_finite().is_ok());
    }

    #[test]
    fn test_ensure_finite_reports_feature() {
        let err = sample().ensure_finite().unwrap_err();
        assert!(err.to_string().contains("'a'"));
    }

    #[test]
    fn test_select_and_slice() {
        let m = sample();
        assert_eq!(m.select(&[3, 0]).row(0), Some(&[4.0, 40.0][..]));
        assert_eq!(m.slice(2, 10).n_rows(), 2);
    }
}
