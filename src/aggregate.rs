//! Aggregator - grouped reductions with deterministic ordering.
//!
//! Groups appear in first-seen row order (stable group-by); ranking ties in
//! [`top_n`] break on that order.

use crate::error::{PipelineError, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::debug;

/// Reduction applied to the metric column within each group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reducer {
    /// Accumulates in Float64 regardless of the source dtype.
    Sum,
    /// Divides by the count of non-null observations only.
    Mean,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Ascending,
    Descending,
}

/// One grouped reduction result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupedSummary {
    /// Group key values, one per grouping column, stringified.
    pub group_key: Vec<String>,
    /// Name of the reduced metric column.
    pub metric: String,
    pub value: f64,
}

/// Grouped reduction over one or more categorical key columns.
///
/// Result order is the first-seen order of each group in the input. Groups
/// whose metric is entirely null are dropped (a mean over zero observations
/// is undefined).
pub fn aggregate(
    df: &DataFrame,
    group_keys: &[&str],
    metric_column: &str,
    reducer: Reducer,
) -> Result<Vec<GroupedSummary>> {
    if group_keys.is_empty() {
        return Err(PipelineError::Aggregation(
            "At least one group key is required".to_string(),
        ));
    }

    let names = df.get_column_names();
    for key in group_keys {
        if !names.contains(key) {
            return Err(PipelineError::Aggregation(format!(
                "Group key column not found: {}",
                key
            )));
        }
    }
    if !names.contains(&metric_column) {
        return Err(PipelineError::Aggregation(format!(
            "Metric column not found: {}",
            metric_column
        )));
    }
    let metric_dtype = df
        .column(metric_column)
        .map_err(|e| PipelineError::Polars(e.to_string()))?
        .dtype()
        .clone();
    if !metric_dtype.is_numeric() {
        return Err(PipelineError::Aggregation(format!(
            "Metric column {} is not numeric (found {})",
            metric_column, metric_dtype
        )));
    }

    let by: Vec<Expr> = group_keys.iter().map(|c| col(c)).collect();
    let agg_expr = match reducer {
        Reducer::Sum => col(metric_column).cast(DataType::Float64).sum(),
        Reducer::Mean => col(metric_column).mean(),
    }
    .alias("value");

    let grouped = df
        .clone()
        .lazy()
        .group_by_stable(by)
        .agg([agg_expr])
        .collect()
        .map_err(|e| {
            PipelineError::Aggregation(format!(
                "Grouped reduction of {} failed: {}",
                metric_column, e
            ))
        })?;

    let key_cols: Vec<Series> = group_keys
        .iter()
        .map(|key| {
            grouped
                .column(key)
                .and_then(|s| s.cast(&DataType::String))
                .map_err(|e| PipelineError::Polars(e.to_string()))
        })
        .collect::<Result<Vec<Series>>>()?;
    let mut key_cas = Vec::with_capacity(key_cols.len());
    for s in &key_cols {
        key_cas.push(s.str().map_err(|e| PipelineError::Polars(e.to_string()))?);
    }
    let values = grouped
        .column("value")
        .map_err(|e| PipelineError::Polars(e.to_string()))?
        .f64()
        .map_err(|e| PipelineError::Polars(e.to_string()))?;

    let mut out = Vec::with_capacity(grouped.height());
    for i in 0..grouped.height() {
        let value = match values.get(i) {
            Some(v) => v,
            None => continue,
        };
        let group_key: Vec<String> = key_cas
            .iter()
            .map(|ca| ca.get(i).unwrap_or("").to_string())
            .collect();
        out.push(GroupedSummary {
            group_key,
            metric: metric_column.to_string(),
            value,
        });
    }

    debug!(
        "Aggregated {} over {:?}: {} groups",
        metric_column,
        group_keys,
        out.len()
    );

    Ok(out)
}

/// First `n` summaries after a stable sort by value.
///
/// Ties are broken by original (first-seen) group order, never arbitrarily.
/// If fewer than `n` summaries exist, all of them are returned in sorted
/// order without error.
pub fn top_n(summaries: &[GroupedSummary], n: usize, direction: Direction) -> Vec<GroupedSummary> {
    let mut sorted: Vec<GroupedSummary> = summaries.to_vec();
    match direction {
        Direction::Ascending => {
            sorted.sort_by(|a, b| a.value.partial_cmp(&b.value).unwrap_or(Ordering::Equal));
        }
        Direction::Descending => {
            sorted.sort_by(|a, b| b.value.partial_cmp(&a.value).unwrap_or(Ordering::Equal));
        }
    }
    sorted.truncate(n);
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> DataFrame {
        df![
            "region" => ["Midwest", "Midwest", "South", "South", "West"],
            "cause_name" => ["Cancer", "Cancer", "Cancer", "Stroke", "Stroke"],
            "deaths" => [100i64, 50, 200, 30, 30],
            "age_adjusted_death_rate" => [Some(50.0), None, Some(80.0), Some(20.0), Some(25.0)]
        ]
        .unwrap()
    }

    #[test]
    fn test_sum_matches_full_partition() {
        let df = fixture();
        let summaries = aggregate(&df, &["region"], "deaths", Reducer::Sum).unwrap();

        let total: f64 = summaries.iter().map(|s| s.value).sum();
        let expected: i64 = df.column("deaths").unwrap().i64().unwrap().sum().unwrap();
        assert_eq!(total, expected as f64);
    }

    #[test]
    fn test_first_seen_group_order() {
        let summaries = aggregate(&fixture(), &["region"], "deaths", Reducer::Sum).unwrap();
        let regions: Vec<&str> = summaries.iter().map(|s| s.group_key[0].as_str()).collect();
        assert_eq!(regions, vec!["Midwest", "South", "West"]);
    }

    #[test]
    fn test_mean_excludes_nulls() {
        let summaries =
            aggregate(&fixture(), &["region"], "age_adjusted_death_rate", Reducer::Mean).unwrap();
        // Midwest has one null rate; mean is over the single observed value
        assert_eq!(summaries[0].group_key, vec!["Midwest"]);
        assert_eq!(summaries[0].value, 50.0);
    }

    #[test]
    fn test_multi_key_grouping() {
        let summaries =
            aggregate(&fixture(), &["region", "cause_name"], "deaths", Reducer::Sum).unwrap();
        assert_eq!(summaries[0].group_key, vec!["Midwest", "Cancer"]);
        assert_eq!(summaries[0].value, 150.0);
        assert_eq!(summaries.len(), 4);
    }

    #[test]
    fn test_unknown_group_key() {
        let err = aggregate(&fixture(), &["county"], "deaths", Reducer::Sum).unwrap_err();
        assert!(matches!(err, PipelineError::Aggregation(_)));
    }

    #[test]
    fn test_non_numeric_metric() {
        let err = aggregate(&fixture(), &["region"], "cause_name", Reducer::Sum).unwrap_err();
        assert!(matches!(err, PipelineError::Aggregation(_)));
    }

    #[test]
    fn test_top_n_tie_break_is_first_seen() {
        let summaries = aggregate(&fixture(), &["region", "cause_name"], "deaths", Reducer::Sum)
            .unwrap();
        // (South, Stroke) and (West, Stroke) are tied at 30
        let bottom = top_n(&summaries, 2, Direction::Ascending);
        assert_eq!(bottom[0].group_key, vec!["South", "Stroke"]);
        assert_eq!(bottom[1].group_key, vec!["West", "Stroke"]);
    }

    #[test]
    fn test_top_n_fewer_groups_than_n() {
        let summaries = aggregate(&fixture(), &["region"], "deaths", Reducer::Sum).unwrap();
        let all = top_n(&summaries, 10, Direction::Descending);
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].group_key, vec!["South"]);
    }
}
