//! Error taxonomy for the unpacking engine.
//!
//! `Config`, `Schema`, and the I/O wrappers are always fatal and surface
//! before any row is processed. `Decode` and `Aggregation` are scoped to a
//! single row (and characterization) and abort the run only in strict mode;
//! in lenient mode they are collected into the failure report instead.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, UnpackError>;

#[derive(Debug, Error)]
pub enum UnpackError {
    #[error("invalid characterization map: {reason}")]
    Config { reason: String },

    #[error("payload column `{column}` not found in input table")]
    Schema { column: String },

    #[error("row {row}: payload is not valid JSON: {reason}")]
    Decode { row: usize, reason: String },

    #[error("row {row}, characterization `{characterization}`: {reason}")]
    Aggregation {
        row: usize,
        characterization: String,
        reason: String,
    },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),
}

impl UnpackError {
    pub fn config(reason: impl Into<String>) -> Self {
        UnpackError::Config {
            reason: reason.into(),
        }
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        UnpackError::Io {
            context: context.into(),
            source,
        }
    }
}
