use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use crate::Metric;

#[derive(Debug, Error, Diagnostic)]
pub enum Error {
    #[error("io {0}")]
    Io(#[from] std::io::Error),
    #[error("arrow {0}")]
    Arrow(#[from] arrow::error::ArrowError),
    #[error("parquet {0}")]
    Parquet(#[from] parquet::errors::ParquetError),
    #[error("json {0}")]
    Json(#[from] serde_json::Error),
    #[error("http {0}")]
    Http(#[from] reqwest::Error),
    #[error("toml parsing failed: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("config not found {0}")]
    ConfigNotFound(PathBuf),
    #[error("file exists: {0}")]
    #[diagnostic(help("pass overwrite to replace the existing snapshot"))]
    SnapshotExists(PathBuf),
    #[error("{metric} limits must be a (low, high) pair, got {len} values")]
    MalformedLimit { metric: Metric, len: usize },
    #[error("empty selection: {0}")]
    EmptySelection(&'static str),
    #[error("malformed frame: {0}")]
    MalformedFrame(String),
    #[error("malformed snapshot metadata: {0}")]
    MalformedSnapshot(String),
    #[error("row {row} out of bounds for table of {len} rows")]
    RowOutOfBounds { row: usize, len: usize },
    #[error("table has no load timestamp")]
    MissingTimestamp,
    #[error("invalid timestamp {0}")]
    InvalidTimestamp(i64),
    #[error("render {0}")]
    Render(String),
}
