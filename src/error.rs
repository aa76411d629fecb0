use thiserror::Error;

#[derive(Error, Debug)]
pub enum KpiEngineError {
    #[error("Unrecognized statement shape in table '{table}': {reason}")]
    UnrecognizedStatementShape { table: String, reason: String },

    #[error("Column '{column}' has no values to impute from")]
    AllValuesMissing { column: String },

    #[error("All statement buckets are empty; refusing to compute KPIs")]
    EmptyInputSet,

    #[error("Required column missing: {0}")]
    MissingColumn(String),

    #[error("Invalid anomaly detector configuration: {0}")]
    InvalidAnomalyConfig(String),

    #[error("Invalid keyword rule set: {0}")]
    InvalidRuleSet(String),

    #[error("Row {row} has {found} values but the table has {expected} columns")]
    RowWidthMismatch {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, KpiEngineError>;
