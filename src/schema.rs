//! Schema Normalizer - standardizes the raw mortality table into the
//! canonical long-form schema.
//!
//! Raw exports of this dataset vary in header casing/whitespace and carry a
//! redundant cause column at a different granularity. Normalization is total
//! and idempotent: running it twice yields the same table.

use crate::error::{PipelineError, Result};
use polars::prelude::*;
use regex::Regex;
use tracing::debug;

/// Canonical column names after normalization.
pub const COL_YEAR: &str = "year";
pub const COL_STATE: &str = "state";
pub const COL_CAUSE: &str = "cause_name";
pub const COL_DEATHS: &str = "deaths";
pub const COL_RATE: &str = "age_adjusted_death_rate";

/// Sentinel cause aggregating every sub-cause for an (entity, year).
pub const ALL_CAUSES: &str = "All causes";
/// Sentinel entity aggregating all states.
pub const NATIONAL_AGGREGATE: &str = "United States";

/// Rate header as it comes out of header canonicalization, before the rename.
const RAW_RATE: &str = "age-adjusted_death_rate";
/// Redundant duplicate of `cause_name` at ICD-113 granularity.
const REDUNDANT_CAUSE: &str = "113_cause_name";

const REQUIRED: [&str; 5] = [COL_YEAR, COL_STATE, COL_CAUSE, COL_DEATHS, COL_RATE];

/// Lower-case a raw header and collapse whitespace runs to underscores.
fn canonical_header(ws: &Regex, raw: &str) -> String {
    ws.replace_all(raw.trim(), "_").to_lowercase()
}

/// Normalize a raw table into the canonical schema.
///
/// Renames every header to its canonical form, renames the rate column,
/// drops the redundant cause column, coerces `deaths`/`age_adjusted_death_rate`
/// strictly to numeric types and casts the categorical string columns to
/// polars Categorical.
pub fn normalize(df: DataFrame) -> Result<DataFrame> {
    let mut df = df;

    // (a) header canonicalization
    let ws = Regex::new(r"\s+")
        .map_err(|e| PipelineError::Schema(format!("Failed to create regex: {}", e)))?;
    let renames: Vec<(String, String)> = df
        .get_column_names()
        .iter()
        .map(|name| (name.to_string(), canonical_header(&ws, name)))
        .filter(|(old, new)| old != new)
        .collect();
    for (old, new) in renames {
        df.rename(&old, &new)
            .map_err(|e| PipelineError::Schema(format!("Failed to rename column {}: {}", old, e)))?;
    }

    // (b) rate column rename
    if df.get_column_names().contains(&RAW_RATE) {
        df.rename(RAW_RATE, COL_RATE)
            .map_err(|e| PipelineError::Schema(format!("Failed to rename rate column: {}", e)))?;
    }

    // (c) drop the redundant cause duplicate
    if df.get_column_names().contains(&REDUNDANT_CAUSE) {
        df = df
            .drop(REDUNDANT_CAUSE)
            .map_err(|e| PipelineError::Schema(format!("Failed to drop {}: {}", REDUNDANT_CAUSE, e)))?;
    }

    // required columns must all be present before coercion
    let missing: Vec<&str> = REQUIRED
        .iter()
        .filter(|c| !df.get_column_names().contains(*c))
        .copied()
        .collect();
    if !missing.is_empty() {
        return Err(PipelineError::Schema(format!(
            "Missing required columns after normalization: {}",
            missing.join(", ")
        )));
    }

    // (d) strict numeric coercion; unparseable cells are an error, not null.
    // Raw exports format death counts with thousands separators.
    let deaths_expr = if matches!(column_dtype(&df, COL_DEATHS)?, DataType::String) {
        col(COL_DEATHS)
            .str()
            .replace_all(lit(","), lit(""), true)
            .strict_cast(DataType::Int64)
    } else {
        col(COL_DEATHS).strict_cast(DataType::Int64)
    };
    let rate_expr = if matches!(column_dtype(&df, COL_RATE)?, DataType::String) {
        col(COL_RATE)
            .str()
            .replace_all(lit(","), lit(""), true)
            .strict_cast(DataType::Float64)
    } else {
        col(COL_RATE).strict_cast(DataType::Float64)
    };

    let df = df
        .lazy()
        .with_columns([
            col(COL_YEAR).strict_cast(DataType::Int64),
            deaths_expr,
            rate_expr,
        ])
        .collect()
        .map_err(|e| PipelineError::Schema(format!("Numeric coercion failed: {}", e)))?;

    // non-negativity of the metric columns
    let deaths_min = df
        .column(COL_DEATHS)
        .map_err(|e| PipelineError::Polars(e.to_string()))?
        .i64()
        .map_err(|e| PipelineError::Polars(e.to_string()))?
        .min();
    if let Some(min) = deaths_min {
        if min < 0 {
            return Err(PipelineError::Schema(format!(
                "Column {} contains negative values (min = {})",
                COL_DEATHS, min
            )));
        }
    }
    let rate_min = df
        .column(COL_RATE)
        .map_err(|e| PipelineError::Polars(e.to_string()))?
        .f64()
        .map_err(|e| PipelineError::Polars(e.to_string()))?
        .min();
    if let Some(min) = rate_min {
        if min < 0.0 {
            return Err(PipelineError::Schema(format!(
                "Column {} contains negative values (min = {})",
                COL_RATE, min
            )));
        }
    }

    // (e) categorical representation for the string key columns
    let df = df
        .lazy()
        .with_columns([
            col(COL_STATE).cast(DataType::Categorical(None, CategoricalOrdering::Physical)),
            col(COL_CAUSE).cast(DataType::Categorical(None, CategoricalOrdering::Physical)),
        ])
        .collect()
        .map_err(|e| PipelineError::Schema(format!("Categorical cast failed: {}", e)))?;

    debug!("Normalized table: {} rows, columns {:?}", df.height(), df.get_column_names());

    Ok(df)
}

fn column_dtype(df: &DataFrame, name: &str) -> Result<DataType> {
    Ok(df
        .column(name)
        .map_err(|e| PipelineError::Polars(e.to_string()))?
        .dtype()
        .clone())
}

// Typed column accessors shared by the downstream stages. Categorical key
// columns are read back through a String cast.

pub(crate) fn string_values(df: &DataFrame, name: &str) -> Result<Vec<String>> {
    let series = df
        .column(name)
        .and_then(|s| s.cast(&DataType::String))
        .map_err(|e| PipelineError::Polars(e.to_string()))?;
    let ca = series.str().map_err(|e| PipelineError::Polars(e.to_string()))?;
    ca.into_iter()
        .enumerate()
        .map(|(i, value)| {
            value
                .map(|v| v.to_string())
                .ok_or_else(|| PipelineError::Schema(format!("Null {} value at row {}", name, i)))
        })
        .collect()
}

pub(crate) fn int_values(df: &DataFrame, name: &str) -> Result<Vec<i64>> {
    let series = df
        .column(name)
        .and_then(|s| s.cast(&DataType::Int64))
        .map_err(|e| PipelineError::Polars(e.to_string()))?;
    let ca = series.i64().map_err(|e| PipelineError::Polars(e.to_string()))?;
    ca.into_iter()
        .enumerate()
        .map(|(i, value)| {
            value.ok_or_else(|| PipelineError::Schema(format!("Null {} value at row {}", name, i)))
        })
        .collect()
}

pub(crate) fn float_values(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let series = df
        .column(name)
        .and_then(|s| s.cast(&DataType::Float64))
        .map_err(|e| PipelineError::Polars(e.to_string()))?;
    let ca = series.f64().map_err(|e| PipelineError::Polars(e.to_string()))?;
    Ok(ca.into_iter().collect())
}
