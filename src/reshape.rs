//! Reshaper - long-to-wide pivot over (state, year, region) keyed rows.
//!
//! The duplicate-key precondition is checked: two input records mapping to
//! the same cell with differing values fail fast rather than overwrite.
//! Missing observations stay null, never zero.

use crate::error::{PipelineError, Result};
use crate::region::COL_REGION;
use crate::schema::{
    float_values, int_values, string_values, COL_CAUSE, COL_RATE, COL_STATE, COL_YEAR,
};
use polars::prelude::*;
use std::collections::HashMap;
use tracing::debug;

/// Pivot the normalized long table into one row per (state, year, region)
/// with one Float64 column per distinct cause.
///
/// Column order is the first-seen order of causes in the input; row order is
/// the first-seen order of (state, year) pairs.
pub fn pivot(df: &DataFrame) -> Result<DataFrame> {
    let states = string_values(df, COL_STATE)?;
    let years = int_values(df, COL_YEAR)?;
    let regions = string_values(df, COL_REGION)?;
    let causes = string_values(df, COL_CAUSE)?;
    let rates = float_values(df, COL_RATE)?;

    // first pass: discover row keys and cause columns in first-seen order
    let mut row_index: HashMap<(String, i64), usize> = HashMap::new();
    let mut row_keys: Vec<(String, i64, String)> = Vec::new();
    let mut col_index: HashMap<String, usize> = HashMap::new();
    let mut cause_columns: Vec<String> = Vec::new();

    for i in 0..df.height() {
        let key = (states[i].clone(), years[i]);
        if !row_index.contains_key(&key) {
            row_index.insert(key, row_keys.len());
            row_keys.push((states[i].clone(), years[i], regions[i].clone()));
        }
        if !col_index.contains_key(&causes[i]) {
            col_index.insert(causes[i].clone(), cause_columns.len());
            cause_columns.push(causes[i].clone());
        }
    }

    // second pass: fill cells, failing on conflicting duplicates
    let mut cells: Vec<Vec<Option<f64>>> = vec![vec![None; cause_columns.len()]; row_keys.len()];
    for i in 0..df.height() {
        let rate = match rates[i] {
            Some(rate) => rate,
            None => continue,
        };
        let row = row_index[&(states[i].clone(), years[i])];
        let col = col_index[&causes[i]];
        match cells[row][col] {
            Some(existing) if existing != rate => {
                return Err(PipelineError::PivotConflict(format!(
                    "Duplicate records for ({}, {}) x {} with differing values: {} vs {}",
                    states[i], years[i], causes[i], existing, rate
                )));
            }
            _ => cells[row][col] = Some(rate),
        }
    }

    let mut columns: Vec<Series> = Vec::with_capacity(3 + cause_columns.len());
    columns.push(Series::new(
        COL_STATE,
        row_keys.iter().map(|(s, _, _)| s.clone()).collect::<Vec<String>>(),
    ));
    columns.push(Series::new(
        COL_YEAR,
        row_keys.iter().map(|(_, y, _)| *y).collect::<Vec<i64>>(),
    ));
    columns.push(Series::new(
        COL_REGION,
        row_keys.iter().map(|(_, _, r)| r.clone()).collect::<Vec<String>>(),
    ));
    for (j, cause) in cause_columns.iter().enumerate() {
        let values: Vec<Option<f64>> = (0..row_keys.len()).map(|i| cells[i][j]).collect();
        columns.push(Series::new(cause, values));
    }

    let wide = DataFrame::new(columns).map_err(|e| PipelineError::Polars(e.to_string()))?;
    debug!(
        "Pivoted {} long rows into {} wide rows x {} cause columns",
        df.height(),
        wide.height(),
        cause_columns.len()
    );

    Ok(wide)
}

/// Melt a wide table back to long form, one row per non-null cell.
///
/// Inverse of [`pivot`]: applied to its output, it reproduces the input
/// record set (state, year, cause, rate) modulo row ordering.
pub fn melt(wide: &DataFrame) -> Result<DataFrame> {
    let id_columns = [COL_STATE, COL_YEAR, COL_REGION];
    let states = string_values(wide, COL_STATE)?;
    let years = int_values(wide, COL_YEAR)?;

    let mut out_states: Vec<String> = Vec::new();
    let mut out_years: Vec<i64> = Vec::new();
    let mut out_causes: Vec<String> = Vec::new();
    let mut out_rates: Vec<f64> = Vec::new();

    for cause in wide.get_column_names() {
        if id_columns.contains(&cause) {
            continue;
        }
        let rates = float_values(wide, cause)?;
        for i in 0..wide.height() {
            if let Some(rate) = rates[i] {
                out_states.push(states[i].clone());
                out_years.push(years[i]);
                out_causes.push(cause.to_string());
                out_rates.push(rate);
            }
        }
    }

    df![
        COL_STATE => out_states,
        COL_YEAR => out_years,
        COL_CAUSE => out_causes,
        COL_RATE => out_rates
    ]
    .map_err(|e| PipelineError::Polars(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn long_fixture() -> DataFrame {
        df![
            COL_STATE => ["Ohio", "Ohio", "Ohio", "Texas"],
            COL_YEAR => [2015i64, 2015, 2015, 2015],
            COL_REGION => ["Midwest", "Midwest", "Midwest", "South"],
            COL_CAUSE => ["Cancer", "Heart disease", "All causes", "Cancer"],
            COL_RATE => [50.0, 55.0, 200.0, 60.0]
        ]
        .unwrap()
    }

    #[test]
    fn test_pivot_shape_and_cells() {
        let wide = pivot(&long_fixture()).unwrap();

        assert_eq!(wide.height(), 2);
        assert_eq!(
            wide.get_column_names(),
            vec![COL_STATE, COL_YEAR, COL_REGION, "Cancer", "Heart disease", "All causes"]
        );

        let cancer = wide.column("Cancer").unwrap().f64().unwrap();
        assert_eq!(cancer.get(0), Some(50.0));
        assert_eq!(cancer.get(1), Some(60.0));

        // Texas has no Heart disease observation: null, not zero
        let heart = wide.column("Heart disease").unwrap().f64().unwrap();
        assert_eq!(heart.get(0), Some(55.0));
        assert_eq!(heart.get(1), None);
    }

    #[test]
    fn test_pivot_conflict_on_differing_duplicates() {
        let df = df![
            COL_STATE => ["Ohio", "Ohio"],
            COL_YEAR => [2015i64, 2015],
            COL_REGION => ["Midwest", "Midwest"],
            COL_CAUSE => ["Cancer", "Cancer"],
            COL_RATE => [50.0, 51.0]
        ]
        .unwrap();
        let err = pivot(&df).unwrap_err();
        assert!(matches!(err, PipelineError::PivotConflict(_)));
    }

    #[test]
    fn test_pivot_tolerates_equal_duplicates() {
        let df = df![
            COL_STATE => ["Ohio", "Ohio"],
            COL_YEAR => [2015i64, 2015],
            COL_REGION => ["Midwest", "Midwest"],
            COL_CAUSE => ["Cancer", "Cancer"],
            COL_RATE => [50.0, 50.0]
        ]
        .unwrap();
        let wide = pivot(&df).unwrap();
        assert_eq!(wide.height(), 1);
        assert_eq!(wide.column("Cancer").unwrap().f64().unwrap().get(0), Some(50.0));
    }

    fn record_set(df: &DataFrame) -> HashSet<(String, i64, String, u64)> {
        let states = string_values(df, COL_STATE).unwrap();
        let years = int_values(df, COL_YEAR).unwrap();
        let causes = string_values(df, COL_CAUSE).unwrap();
        let rates = float_values(df, COL_RATE).unwrap();
        (0..df.height())
            .map(|i| {
                (
                    states[i].clone(),
                    years[i],
                    causes[i].clone(),
                    rates[i].unwrap().to_bits(),
                )
            })
            .collect()
    }

    #[test]
    fn test_melt_pivot_round_trip() {
        let long = long_fixture();
        let melted = melt(&pivot(&long).unwrap()).unwrap();

        assert_eq!(record_set(&melted), record_set(&long));
    }
}
