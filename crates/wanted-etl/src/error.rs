//! Error types for the pipeline.
//!
//! Fetch-level failures live in [`crate::http::FetchError`] and are absorbed
//! by the fetcher. Everything here is structural and terminates a run.

/// All errors that abort a pipeline run.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A page payload lacks a required key. `available` lists the keys the
    /// page did carry, sorted.
    #[error("Page {page}: key '{key}' not found. Available keys: {available:?}")]
    MissingKey {
        page: u32,
        key: String,
        available: Vec<String>,
    },

    #[error("Page {page}: {message}")]
    Shape { page: u32, message: String },

    #[error("Schema mismatch: {declared} column names declared but {produced} columns produced")]
    SchemaMismatch { declared: usize, produced: usize },

    #[error("Column '{column}' has {found} values, expected {expected}")]
    RaggedColumn {
        column: String,
        expected: usize,
        found: usize,
    },

    #[error("HTTP client error: {0}")]
    Http(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub type PipelineResult<T> = Result<T, PipelineError>;
