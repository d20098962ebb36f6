//! Pipeline orchestrator - wires the stages into one batch run.
//!
//! Each stage consumes the complete output of the previous one and produces
//! a new immutable table; nothing is mutated in place and nothing is
//! retried. The caller supplies grouping keys, the top-N count, correlation
//! exclusions and the anomaly target through [`PipelineConfig`].

use crate::aggregate::{aggregate, top_n, Direction, GroupedSummary, Reducer};
use crate::anomaly::{detect, ProportionRecord};
use crate::correlation::{correlate, CorrelationMatrix};
use crate::error::{PipelineError, Result};
use crate::region::{with_region, COL_REGION};
use crate::reshape::pivot;
use crate::schema::{
    float_values, int_values, normalize, string_values, ALL_CAUSES, COL_CAUSE, COL_DEATHS,
    COL_RATE, COL_STATE, COL_YEAR, NATIONAL_AGGREGATE,
};
use polars::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;

/// Caller-supplied parameters for one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Grouping columns for the regional summaries.
    pub group_keys: Vec<String>,
    /// Number of leading causes to keep.
    pub top_n: usize,
    /// Identifier columns excluded from the correlation matrix.
    pub exclude_columns: Vec<String>,
    /// Entity whose coverage ratios are computed.
    pub anomaly_entity: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            group_keys: vec![COL_REGION.to_string(), COL_CAUSE.to_string()],
            top_n: 10,
            exclude_columns: vec![
                COL_STATE.to_string(),
                COL_YEAR.to_string(),
                COL_REGION.to_string(),
            ],
            anomaly_entity: "District of Columbia".to_string(),
        }
    }
}

/// One year of the national "All causes" rate series.
#[derive(Debug, Clone, Serialize)]
pub struct TrendPoint {
    pub year: i32,
    pub rate: f64,
}

/// The derived tables handed to rendering/report consumers.
#[derive(Debug)]
pub struct PipelineArtifacts {
    /// Sum of deaths per group (first-seen group order).
    pub grouped_deaths: Vec<GroupedSummary>,
    /// Mean age-adjusted rate per group.
    pub grouped_mean_rates: Vec<GroupedSummary>,
    /// Top-N groups by summed deaths.
    pub leading_causes: Vec<GroupedSummary>,
    /// Wide table: one row per (state, year), one column per cause.
    pub wide: DataFrame,
    pub correlation: CorrelationMatrix,
    /// Coverage ratios for the configured anomaly entity, year ascending.
    pub proportions: Vec<ProportionRecord>,
    /// National "All causes" rate by year.
    pub national_trend: Vec<TrendPoint>,
}

/// "Leading causes" filter: drops the "All causes" rows and the national
/// aggregate entity so grouped sums only see real sub-cause records. Kept
/// caller-side; the aggregator itself never special-cases these sentinels.
pub fn exclude_aggregates(df: &DataFrame) -> Result<DataFrame> {
    df.clone()
        .lazy()
        .filter(
            col(COL_CAUSE)
                .cast(DataType::String)
                .neq(lit(ALL_CAUSES))
                .and(col(COL_STATE).cast(DataType::String).neq(lit(NATIONAL_AGGREGATE))),
        )
        .collect()
        .map_err(|e| PipelineError::Polars(e.to_string()))
}

/// The "United States" / "All causes" rate per year, ascending. Years where
/// the national aggregate was not reported are simply absent.
pub fn national_trend(df: &DataFrame) -> Result<Vec<TrendPoint>> {
    let states = string_values(df, COL_STATE)?;
    let years = int_values(df, COL_YEAR)?;
    let causes = string_values(df, COL_CAUSE)?;
    let rates = float_values(df, COL_RATE)?;

    let mut by_year: BTreeMap<i64, f64> = BTreeMap::new();
    for i in 0..df.height() {
        if states[i] != NATIONAL_AGGREGATE || causes[i] != ALL_CAUSES {
            continue;
        }
        if let Some(rate) = rates[i] {
            by_year.entry(years[i]).or_insert(rate);
        }
    }

    Ok(by_year
        .into_iter()
        .map(|(year, rate)| TrendPoint {
            year: year as i32,
            rate,
        })
        .collect())
}

/// Run the full pipeline over one raw snapshot.
pub fn run(raw: DataFrame, config: &PipelineConfig) -> Result<PipelineArtifacts> {
    info!("Pipeline starting: {} raw rows", raw.height());

    let normalized = normalize(raw)?;
    let classified = with_region(normalized)?;
    info!("Normalized and classified: {} rows", classified.height());

    let group_keys: Vec<&str> = config.group_keys.iter().map(|s| s.as_str()).collect();
    let filtered = exclude_aggregates(&classified)?;
    let grouped_deaths = aggregate(&filtered, &group_keys, COL_DEATHS, Reducer::Sum)?;
    let grouped_mean_rates = aggregate(&filtered, &group_keys, COL_RATE, Reducer::Mean)?;
    let leading_causes = top_n(&grouped_deaths, config.top_n, Direction::Descending);
    info!(
        "Aggregated {} groups over {:?}, kept top {}",
        grouped_deaths.len(),
        config.group_keys,
        leading_causes.len()
    );

    let wide = pivot(&classified)?;
    let exclude: Vec<&str> = config.exclude_columns.iter().map(|s| s.as_str()).collect();
    let correlation = correlate(&wide, &exclude)?;
    let proportions = detect(&classified, &config.anomaly_entity)?;
    let national_trend = national_trend(&classified)?;

    info!(
        "Pipeline complete: {} wide rows, {} correlated columns, {} coverage records",
        wide.height(),
        correlation.columns.len(),
        proportions.len()
    );

    Ok(PipelineArtifacts {
        grouped_deaths,
        grouped_mean_rates,
        leading_causes,
        wide,
        correlation,
        proportions,
        national_trend,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exclude_aggregates() {
        let df = df![
            COL_STATE => ["Ohio", "Ohio", "United States"],
            COL_YEAR => [2015i64, 2015, 2015],
            COL_CAUSE => ["Cancer", ALL_CAUSES, "Cancer"],
            COL_DEATHS => [100i64, 400, 5000],
            COL_RATE => [50.0, 200.0, 55.0]
        ]
        .unwrap();

        let filtered = exclude_aggregates(&df).unwrap();
        assert_eq!(filtered.height(), 1);
        let states = string_values(&filtered, COL_STATE).unwrap();
        assert_eq!(states, vec!["Ohio"]);
    }

    #[test]
    fn test_national_trend_ascending() {
        let df = df![
            COL_STATE => ["United States", "United States", "Ohio"],
            COL_YEAR => [2016i64, 2015, 2015],
            COL_CAUSE => [ALL_CAUSES, ALL_CAUSES, ALL_CAUSES],
            COL_RATE => [728.8, 733.1, 850.0]
        ]
        .unwrap();

        let trend = national_trend(&df).unwrap();
        assert_eq!(trend.len(), 2);
        assert_eq!(trend[0].year, 2015);
        assert_eq!(trend[0].rate, 733.1);
        assert_eq!(trend[1].year, 2016);
    }
}
