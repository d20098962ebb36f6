//! CSV ingestion - loads the raw mortality table into a DataFrame.
//!
//! Retrieval of the dataset from a remote source is out of scope; the loaders
//! accept a local file path or raw CSV text and hand back an in-memory table
//! for the normalizer.

use crate::error::{PipelineError, Result};
use polars::prelude::*;
use std::io::Cursor;
use std::path::Path;
use tracing::info;

/// Load a raw CSV file into a DataFrame.
///
/// Schema inference is bounded so a malformed tail cannot flip column types
/// after the fact; strict typing happens later in the normalizer anyway.
pub fn load_csv(path: &Path) -> Result<DataFrame> {
    if !path.exists() {
        return Err(PipelineError::Schema(format!(
            "Input file not found: {}",
            path.display()
        )));
    }

    let df = LazyCsvReader::new(path)
        .with_infer_schema_length(Some(1000))
        .finish()
        .map_err(|e| PipelineError::Polars(format!("Failed to read CSV {}: {}", path.display(), e)))?
        .collect()
        .map_err(|e| PipelineError::Polars(format!("Failed to collect CSV {}: {}", path.display(), e)))?;

    info!("Loaded {} rows x {} columns from {}", df.height(), df.width(), path.display());

    Ok(df)
}

/// Parse raw CSV text into a DataFrame.
pub fn read_csv_str(text: &str) -> Result<DataFrame> {
    let cursor = Cursor::new(text.as_bytes().to_vec());

    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(1000))
        .into_reader_with_file_handle(cursor)
        .finish()
        .map_err(|e| PipelineError::Polars(format!("Failed to parse CSV text: {}", e)))?;

    Ok(df)
}
