use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Aggregation error: {0}")]
    Aggregation(String),

    #[error("Pivot conflict: {0}")]
    PivotConflict(String),

    #[error("Missing baseline: no 'All causes' record for {entity} in {year}")]
    MissingBaseline { entity: String, year: i32 },

    #[error("Division error: 'All causes' rate is zero for {entity} in {year}")]
    Division { entity: String, year: i32 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Polars error: {0}")]
    Polars(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
