//! Error types for RFM scoring.
//!
//! Every failure mode has a named variant so callers can match on it.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RfmError {
    /// A column the operation needs is absent from the input table
    #[error("Missing required column: {0}")]
    MissingColumn(String),

    /// Fewer customers than requested clusters
    #[error("Insufficient data: requested {requested} clusters but only {available} customers")]
    InsufficientData { requested: usize, available: usize },

    #[error("Invalid cluster count: {0} (must be at least 1)")]
    InvalidClusterCount(usize),

    #[error("Column {0} contains null values")]
    NullValue(String),

    #[error("Column {column} has unsupported type {dtype}")]
    InvalidColumnType { column: String, dtype: String },

    #[error("Unparseable invoice date at row {row}: {value:?}")]
    InvalidTimestamp { row: usize, value: String },

    /// Labels and table disagree in length, or a label has no center
    #[error("Cluster labels do not match table: {0}")]
    LabelMismatch(String),

    #[error("Clustering failed: {0}")]
    Clustering(String),

    #[error("Failed to write {path}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Plotting failed: {0}")]
    Plot(String),

    #[error("Data frame error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),
}
