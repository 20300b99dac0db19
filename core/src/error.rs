use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid {table} record at line {line}: {reason}")]
    InvalidRecord {
        table: &'static str,
        line: usize,
        reason: String,
    },

    #[error("Join '{join}' violated its cardinality contract: {detail}")]
    JoinCardinality { join: &'static str, detail: String },

    #[error("Shape of '{stage}' is {actual_rows}x{actual_cols}, expected {expected_rows}x{expected_cols}")]
    ShapeMismatch {
        stage: &'static str,
        expected_rows: usize,
        expected_cols: usize,
        actual_rows: usize,
        actual_cols: usize,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Got {labels} cluster labels for {rows} rows")]
    LabelCount { labels: usize, rows: usize },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type PipelineResult<T> = Result<T, PipelineError>;
