//! Correlation Engine - pairwise Pearson correlation over the wide table.
//!
//! Pairwise-complete semantics: a row is dropped only from the pairs where
//! one side is null, not from the whole matrix. Zero-variance columns have no
//! defined correlation; those cells carry an explicit `None`, never NaN.

use crate::error::{PipelineError, Result};
use itertools::Itertools;
use polars::prelude::*;
use serde::Serialize;
use tracing::debug;

/// Square, symmetric correlation matrix over the numeric cause columns.
#[derive(Debug, Clone, Serialize)]
pub struct CorrelationMatrix {
    pub columns: Vec<String>,
    /// `values[i][j]` is the correlation between columns i and j; `None`
    /// marks an undefined entry (zero variance or fewer than two complete
    /// observation pairs). Serializes as JSON null.
    pub values: Vec<Vec<Option<f64>>>,
}

impl CorrelationMatrix {
    /// Entry for a pair of columns by name.
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.columns.iter().position(|c| c == a)?;
        let j = self.columns.iter().position(|c| c == b)?;
        self.values[i][j]
    }
}

/// Compute the Pearson correlation matrix over the numeric columns of
/// `wide`, skipping `exclude_columns` and any non-numeric column.
pub fn correlate(wide: &DataFrame, exclude_columns: &[&str]) -> Result<CorrelationMatrix> {
    let mut columns: Vec<String> = Vec::new();
    let mut data: Vec<Vec<Option<f64>>> = Vec::new();

    for name in wide.get_column_names() {
        if exclude_columns.contains(&name) {
            continue;
        }
        let series = wide
            .column(name)
            .map_err(|e| PipelineError::Polars(e.to_string()))?;
        if !series.dtype().is_numeric() {
            continue;
        }
        let series = series
            .cast(&DataType::Float64)
            .map_err(|e| PipelineError::Polars(e.to_string()))?;
        let ca = series.f64().map_err(|e| PipelineError::Polars(e.to_string()))?;
        data.push(ca.into_iter().collect());
        columns.push(name.to_string());
    }

    let k = columns.len();
    let mut values: Vec<Vec<Option<f64>>> = vec![vec![None; k]; k];

    for i in 0..k {
        let observed: Vec<f64> = data[i].iter().flatten().copied().collect();
        values[i][i] = if has_variance(&observed) { Some(1.0) } else { None };
    }

    for (i, j) in (0..k).tuple_combinations() {
        let pairs: Vec<(f64, f64)> = data[i]
            .iter()
            .zip(data[j].iter())
            .filter_map(|(x, y)| match (x, y) {
                (Some(x), Some(y)) => Some((*x, *y)),
                _ => None,
            })
            .collect();
        let r = pearson(&pairs);
        values[i][j] = r;
        values[j][i] = r;
    }

    debug!("Correlation matrix over {} columns", k);

    Ok(CorrelationMatrix { columns, values })
}

fn has_variance(observed: &[f64]) -> bool {
    if observed.len() < 2 {
        return false;
    }
    let mean = observed.iter().sum::<f64>() / observed.len() as f64;
    observed.iter().any(|v| (v - mean).abs() > 0.0)
}

/// Pearson correlation over complete observation pairs. `None` when fewer
/// than two pairs exist or either side has zero variance.
fn pearson(pairs: &[(f64, f64)]) -> Option<f64> {
    if pairs.len() < 2 {
        return None;
    }
    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|(_, y)| y).sum::<f64>() / n;

    let mut sxx = 0.0;
    let mut syy = 0.0;
    let mut sxy = 0.0;
    for (x, y) in pairs {
        let dx = x - mean_x;
        let dy = y - mean_y;
        sxx += dx * dx;
        syy += dy * dy;
        sxy += dx * dy;
    }

    if sxx == 0.0 || syy == 0.0 {
        return None;
    }
    Some(sxy / (sxx * syy).sqrt())
}
