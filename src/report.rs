//! Report glue - JSON export of the derived tables.
//!
//! Downstream rendering and report generation consume the pipeline output as
//! JSON. Missing cells stay `null` so the "no value" marker survives the
//! exchange format, and undefined correlations serialize as `null` rather
//! than NaN.

use crate::error::{PipelineError, Result};
use crate::pipeline::PipelineArtifacts;
use polars::prelude::*;
use serde_json::{json, Value};

/// Convert a DataFrame to a JSON value of the form
/// `{"columns": [...], "rows": [{col: value, ...}, ...]}`.
pub fn dataframe_to_json(df: &DataFrame) -> Result<Value> {
    let columns: Vec<String> = df.get_column_names().iter().map(|s| s.to_string()).collect();

    // categorical columns export as their string values
    let mut series_list: Vec<Series> = Vec::with_capacity(columns.len());
    for name in &columns {
        let series = df
            .column(name)
            .map_err(|e| PipelineError::Polars(e.to_string()))?;
        let series = if matches!(series.dtype(), DataType::Categorical(_, _)) {
            series
                .cast(&DataType::String)
                .map_err(|e| PipelineError::Polars(e.to_string()))?
        } else {
            series.clone()
        };
        series_list.push(series);
    }

    let mut rows = Vec::with_capacity(df.height());
    for row_idx in 0..df.height() {
        let mut row = serde_json::Map::new();
        for (name, series) in columns.iter().zip(&series_list) {
            row.insert(name.clone(), series_to_json_value(series, row_idx)?);
        }
        rows.push(Value::Object(row));
    }

    Ok(json!({
        "columns": columns,
        "rows": rows
    }))
}

fn series_to_json_value(series: &Series, row_idx: usize) -> Result<Value> {
    let any_val = series
        .get(row_idx)
        .map_err(|e| PipelineError::Polars(format!("Failed to get value: {}", e)))?;

    if any_val.is_null() {
        return Ok(Value::Null);
    }

    match any_val {
        AnyValue::Null => Ok(Value::Null),
        AnyValue::Boolean(b) => Ok(Value::Bool(b)),
        AnyValue::String(s) => Ok(Value::String(s.to_string())),
        AnyValue::Int32(i) => Ok(Value::Number(i.into())),
        AnyValue::Int64(i) => Ok(Value::Number(i.into())),
        AnyValue::UInt32(u) => Ok(Value::Number(u.into())),
        AnyValue::UInt64(u) => Ok(Value::Number(u.into())),
        AnyValue::Float64(f) => Ok(serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null)),
        AnyValue::Float32(f) => Ok(serde_json::Number::from_f64(f as f64)
            .map(Value::Number)
            .unwrap_or(Value::Null)),
        other => Ok(Value::String(format!("{}", other))),
    }
}

/// Bundle every pipeline artifact into one JSON document.
pub fn artifacts_to_json(artifacts: &PipelineArtifacts) -> Result<Value> {
    Ok(json!({
        "grouped_deaths": serde_json::to_value(&artifacts.grouped_deaths)?,
        "grouped_mean_rates": serde_json::to_value(&artifacts.grouped_mean_rates)?,
        "leading_causes": serde_json::to_value(&artifacts.leading_causes)?,
        "wide": dataframe_to_json(&artifacts.wide)?,
        "correlation": serde_json::to_value(&artifacts.correlation)?,
        "proportions": serde_json::to_value(&artifacts.proportions)?,
        "national_trend": serde_json::to_value(&artifacts.national_trend)?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dataframe_to_json_preserves_nulls() {
        let df = df![
            "state" => ["Ohio", "Texas"],
            "Cancer" => [Some(50.0), None]
        ]
        .unwrap();

        let value = dataframe_to_json(&df).unwrap();
        assert_eq!(value["columns"], json!(["state", "Cancer"]));
        assert_eq!(value["rows"][0]["Cancer"], json!(50.0));
        assert_eq!(value["rows"][1]["Cancer"], Value::Null);
    }

    #[test]
    fn test_categorical_column_exports_as_string() {
        let df = df!["state" => ["Ohio"]]
            .unwrap()
            .lazy()
            .with_columns([polars::prelude::col("state")
                .cast(DataType::Categorical(None, CategoricalOrdering::Physical))])
            .collect()
            .unwrap();

        let value = dataframe_to_json(&df).unwrap();
        assert_eq!(value["rows"][0]["state"], json!("Ohio"));
    }
}
