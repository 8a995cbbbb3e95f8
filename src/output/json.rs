//! JSON record output
//!
//! Records are written as one JSON array of objects. Field order within each
//! object follows the schema.

use crate::extract::Record;
use crate::output::traits::{OutputResult, RecordWriter};
use std::io::Write;

/// Writes records as a JSON array
#[derive(Debug, Clone, Copy)]
pub struct JsonWriter {
    pub pretty: bool,
}

impl Default for JsonWriter {
    fn default() -> Self {
        Self { pretty: true }
    }
}

impl RecordWriter for JsonWriter {
    fn write_records(&self, records: &[Record], out: &mut dyn Write) -> OutputResult<()> {
        if self.pretty {
            serde_json::to_writer_pretty(&mut *out, records)?;
        } else {
            serde_json::to_writer(&mut *out, records)?;
        }
        out.write_all(b"\n")?;
        Ok(())
    }

    fn extension(&self) -> &'static str {
        "json"
    }
}
