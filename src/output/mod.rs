//! Output module for writing records and crawl summaries
//!
//! This module handles:
//! - Writing extracted records as JSON or CSV
//! - Writing the list of failed URLs
//! - Printing and exporting crawl summaries

mod csv;
mod json;
mod markdown;
mod summary;
mod traits;

pub use self::csv::CsvWriter;
pub use json::JsonWriter;
pub use markdown::{format_markdown_summary, generate_markdown_summary};
pub use summary::{print_summary, CrawlSummary};
pub use traits::{OutputError, OutputResult, RecordWriter};

use crate::extract::Record;
use crate::state::CrawlFailure;
use serde::Deserialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

/// Record serialization format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    Csv,
}

impl OutputFormat {
    /// Picks a format from a file extension, defaulting to JSON
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => Self::Csv,
            _ => Self::Json,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
        }
    }

    /// Returns the writer for this format
    pub fn writer(&self) -> Box<dyn RecordWriter> {
        match self {
            Self::Json => Box::new(JsonWriter::default()),
            Self::Csv => Box::new(CsvWriter),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = OutputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            other => Err(OutputError::Format(format!(
                "unknown output format '{}' (expected json or csv)",
                other
            ))),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Writes records to a file
///
/// # Arguments
///
/// * `records` - Records in output order
/// * `path` - Destination file; created or truncated
/// * `format` - Serialization format
///
/// # Returns
///
/// * `Ok(())` - Successfully wrote every record
/// * `Err(OutputError)` - Failed to create or write the file
pub fn write_records(records: &[Record], path: &Path, format: OutputFormat) -> OutputResult<()> {
    let file = File::create(path)?;
    let mut out = BufWriter::new(file);
    write_records_to(records, &mut out, format)?;
    out.flush()?;
    tracing::info!("Wrote {} records to {}", records.len(), path.display());
    Ok(())
}

/// Writes records to any byte sink, e.g. stdout
pub fn write_records_to(
    records: &[Record],
    out: &mut dyn Write,
    format: OutputFormat,
) -> OutputResult<()> {
    format.writer().write_records(records, out)
}

/// Writes failed URLs as a JSON array of `{url, kind, message}` objects
pub fn write_failures(failures: &[CrawlFailure], path: &Path) -> OutputResult<()> {
    let file = File::create(path)?;
    let mut out = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut out, failures)?;
    out.write_all(b"\n")?;
    out.flush()?;
    tracing::info!("Wrote {} failures to {}", failures.len(), path.display());
    Ok(())
}
