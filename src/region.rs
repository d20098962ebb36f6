//! Region Classifier - assigns each record to a US census region.
//!
//! Classification is a pure function of the entity name over four fixed
//! lookup sets. An entity outside every set keeps its own name as its
//! region; that passthrough arm is how "United States" aggregate rows become
//! their own pseudo-region rather than an error.

use crate::error::{PipelineError, Result};
use crate::schema::COL_STATE;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Column appended by [`with_region`].
pub const COL_REGION: &str = "region";

const NORTHEAST: [&str; 9] = [
    "Connecticut",
    "Maine",
    "Massachusetts",
    "New Hampshire",
    "New Jersey",
    "New York",
    "Pennsylvania",
    "Rhode Island",
    "Vermont",
];

const MIDWEST: [&str; 12] = [
    "Illinois",
    "Indiana",
    "Iowa",
    "Kansas",
    "Michigan",
    "Minnesota",
    "Missouri",
    "Nebraska",
    "North Dakota",
    "Ohio",
    "South Dakota",
    "Wisconsin",
];

const SOUTH: [&str; 17] = [
    "Alabama",
    "Arkansas",
    "Delaware",
    "District of Columbia",
    "Florida",
    "Georgia",
    "Kentucky",
    "Louisiana",
    "Maryland",
    "Mississippi",
    "North Carolina",
    "Oklahoma",
    "South Carolina",
    "Tennessee",
    "Texas",
    "Virginia",
    "West Virginia",
];

const WEST: [&str; 13] = [
    "Alaska",
    "Arizona",
    "California",
    "Colorado",
    "Hawaii",
    "Idaho",
    "Montana",
    "Nevada",
    "New Mexico",
    "Oregon",
    "Utah",
    "Washington",
    "Wyoming",
];

/// Region assignment for one entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Region {
    Northeast,
    Midwest,
    South,
    West,
    /// Entity not in any census lookup set; keeps its own name as its label.
    Passthrough(String),
}

impl Region {
    /// Classify an entity name. Total - every entity gets a region.
    pub fn classify(entity: &str) -> Region {
        if NORTHEAST.contains(&entity) {
            Region::Northeast
        } else if MIDWEST.contains(&entity) {
            Region::Midwest
        } else if SOUTH.contains(&entity) {
            Region::South
        } else if WEST.contains(&entity) {
            Region::West
        } else {
            Region::Passthrough(entity.to_string())
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Region::Northeast => "Northeast",
            Region::Midwest => "Midwest",
            Region::South => "South",
            Region::West => "West",
            Region::Passthrough(name) => name,
        }
    }
}

/// Append a categorical `region` column derived from the entity column.
pub fn with_region(df: DataFrame) -> Result<DataFrame> {
    let entities = df
        .column(COL_STATE)
        .map_err(|e| PipelineError::Polars(e.to_string()))?
        .cast(&DataType::String)
        .map_err(|e| PipelineError::Polars(e.to_string()))?;
    let entities = entities
        .str()
        .map_err(|e| PipelineError::Polars(e.to_string()))?;

    let labels: Vec<Option<String>> = entities
        .into_iter()
        .map(|entity| entity.map(|e| Region::classify(e).label().to_string()))
        .collect();

    let mut df = df;
    df.with_column(Series::new(COL_REGION, labels))
        .map_err(|e| PipelineError::Polars(e.to_string()))?;

    let df = df
        .lazy()
        .with_columns([
            col(COL_REGION).cast(DataType::Categorical(None, CategoricalOrdering::Physical)),
        ])
        .collect()
        .map_err(|e| PipelineError::Polars(e.to_string()))?;

    debug!("Region column appended ({} rows)", df.height());

    Ok(df)
}
