//! Proportion-Anomaly Detector - per-year coverage ratio for one entity.
//!
//! Compares the sum of sub-cause rates against the "All causes" baseline for
//! each year the entity appears in. The ratio is computed and exposed here;
//! deciding whether a deviation from 1.0 matters is a reporting concern.

use crate::error::{PipelineError, Result};
use crate::schema::{
    float_values, int_values, string_values, ALL_CAUSES, COL_CAUSE, COL_RATE, COL_STATE, COL_YEAR,
};
use polars::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

/// Coverage of the "All causes" baseline by the sub-cause rates of one
/// (entity, year). Expected near 1.0 when the sub-causes are exhaustive.
#[derive(Debug, Clone, Serialize)]
pub struct ProportionRecord {
    pub entity: String,
    pub year: i32,
    pub sum_of_subcauses: f64,
    pub all_causes_value: f64,
    pub coverage_ratio: f64,
}

/// Compute one [`ProportionRecord`] per year present for `entity`, ordered
/// by year ascending.
///
/// Fails with [`PipelineError::MissingBaseline`] when a year has no
/// "All causes" record and [`PipelineError::Division`] when the baseline
/// rate is zero.
pub fn detect(df: &DataFrame, entity: &str) -> Result<Vec<ProportionRecord>> {
    let states = string_values(df, COL_STATE)?;
    let years = int_values(df, COL_YEAR)?;
    let causes = string_values(df, COL_CAUSE)?;
    let rates = float_values(df, COL_RATE)?;

    // BTreeMap keys keep the output year-ascending without a sort
    let mut by_year: BTreeMap<i64, (f64, Option<f64>)> = BTreeMap::new();
    for i in 0..df.height() {
        if states[i] != entity {
            continue;
        }
        let (subcause_sum, baseline) = by_year.entry(years[i]).or_insert((0.0, None));
        if causes[i] == ALL_CAUSES {
            if baseline.is_none() {
                *baseline = rates[i];
            }
        } else if let Some(rate) = rates[i] {
            *subcause_sum += rate;
        }
    }

    let mut records = Vec::with_capacity(by_year.len());
    for (year, (sum_of_subcauses, baseline)) in by_year {
        let all_causes_value = baseline.ok_or_else(|| PipelineError::MissingBaseline {
            entity: entity.to_string(),
            year: year as i32,
        })?;
        if all_causes_value == 0.0 {
            return Err(PipelineError::Division {
                entity: entity.to_string(),
                year: year as i32,
            });
        }
        records.push(ProportionRecord {
            entity: entity.to_string(),
            year: year as i32,
            sum_of_subcauses,
            all_causes_value,
            coverage_ratio: sum_of_subcauses / all_causes_value,
        });
    }

    debug!("Coverage ratios for {}: {} years", entity, records.len());

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coverage_ratio() {
        // ten sub-causes at 70.0 each plus the baseline record
        let mut causes: Vec<String> = (1..=10).map(|i| format!("Cause {}", i)).collect();
        causes.push(ALL_CAUSES.to_string());
        let mut rates = vec![70.0; 10];
        rates.push(1000.0);

        let df = df![
            COL_STATE => vec!["District of Columbia"; 11],
            COL_YEAR => vec![2016i64; 11],
            COL_CAUSE => causes,
            COL_RATE => rates
        ]
        .unwrap();

        let records = detect(&df, "District of Columbia").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].year, 2016);
        assert_eq!(records[0].all_causes_value, 1000.0);
        assert!((records[0].sum_of_subcauses - 700.0).abs() < 1e-9);
        assert!((records[0].coverage_ratio - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_years_ascending() {
        let df = df![
            COL_STATE => ["Ohio", "Ohio", "Ohio", "Ohio"],
            COL_YEAR => [2017i64, 2015, 2017, 2015],
            COL_CAUSE => [ALL_CAUSES, ALL_CAUSES, "Cancer", "Cancer"],
            COL_RATE => [800.0, 850.0, 160.0, 165.0]
        ]
        .unwrap();

        let records = detect(&df, "Ohio").unwrap();
        let years: Vec<i32> = records.iter().map(|r| r.year).collect();
        assert_eq!(years, vec![2015, 2017]);
    }

    #[test]
    fn test_missing_baseline() {
        let df = df![
            COL_STATE => ["Ohio", "Ohio"],
            COL_YEAR => [2015i64, 2015],
            COL_CAUSE => ["Cancer", "Stroke"],
            COL_RATE => [160.0, 40.0]
        ]
        .unwrap();

        let err = detect(&df, "Ohio").unwrap_err();
        assert!(matches!(
            err,
            PipelineError::MissingBaseline { year: 2015, .. }
        ));
    }

    #[test]
    fn test_zero_baseline() {
        let df = df![
            COL_STATE => ["Ohio", "Ohio"],
            COL_YEAR => [2015i64, 2015],
            COL_CAUSE => [ALL_CAUSES, "Cancer"],
            COL_RATE => [0.0, 160.0]
        ]
        .unwrap();

        let err = detect(&df, "Ohio").unwrap_err();
        assert!(matches!(err, PipelineError::Division { year: 2015, .. }));
    }

    #[test]
    fn test_other_entities_ignored() {
        let df = df![
            COL_STATE => ["Ohio", "Texas"],
            COL_YEAR => [2015i64, 2015],
            COL_CAUSE => [ALL_CAUSES, "Cancer"],
            COL_RATE => [850.0, 160.0]
        ]
        .unwrap();

        let records = detect(&df, "Ohio").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].sum_of_subcauses, 0.0);
        assert_eq!(records[0].coverage_ratio, 0.0);
    }
}
