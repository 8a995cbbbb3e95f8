//! Output error and writer trait
//!
//! This module defines the trait interface for record writers and the
//! errors shared by every output operation.

use crate::extract::Record;
use std::io::Write;
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to write output: {0}")]
    Write(String),

    #[error("Failed to format output: {0}")]
    Format(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Serializes a batch of records to a byte sink
pub trait RecordWriter {
    /// Writes every record, in order
    fn write_records(&self, records: &[Record], out: &mut dyn Write) -> OutputResult<()>;

    /// Conventional file extension for this format
    fn extension(&self) -> &'static str;
}
