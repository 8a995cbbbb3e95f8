//! CSV record output
//!
//! The header is the union of field names across all records, in first-seen
//! order. Missing fields are empty cells; list and nested values are written
//! as JSON strings. Cells are quoted when they contain a comma, a quote or a
//! line break.

use crate::extract::{FieldValue, Record};
use crate::output::traits::{OutputResult, RecordWriter};
use std::io::Write;

/// Writes records as RFC 4180 CSV
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvWriter;

impl RecordWriter for CsvWriter {
    fn write_records(&self, records: &[Record], out: &mut dyn Write) -> OutputResult<()> {
        let columns = header(records);
        if columns.is_empty() {
            return Ok(());
        }

        write_row(out, columns.iter().map(|c| c.to_string()))?;
        for record in records {
            let cells = columns
                .iter()
                .map(|column| record.get(column).map(render_cell).transpose())
                .collect::<OutputResult<Vec<_>>>()?;
            write_row(out, cells.into_iter().map(Option::unwrap_or_default))?;
        }
        Ok(())
    }

    fn extension(&self) -> &'static str {
        "csv"
    }
}

/// Union of field names in first-seen order
fn header(records: &[Record]) -> Vec<&str> {
    let mut columns: Vec<&str> = Vec::new();
    for name in records.iter().flat_map(|record| record.names()) {
        if !columns.contains(&name) {
            columns.push(name);
        }
    }
    columns
}

fn render_cell(value: &FieldValue) -> OutputResult<String> {
    Ok(match value {
        FieldValue::Missing => String::new(),
        FieldValue::Text(text) => text.clone(),
        FieldValue::List(_) | FieldValue::Records(_) | FieldValue::Json(_) => {
            serde_json::to_string(value)?
        }
    })
}

fn write_row(out: &mut dyn Write, cells: impl Iterator<Item = String>) -> OutputResult<()> {
    let line = cells.map(|cell| escape(&cell)).collect::<Vec<_>>().join(",");
    out.write_all(line.as_bytes())?;
    out.write_all(b"\r\n")?;
    Ok(())
}

fn escape(cell: &str) -> String {
    if cell.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}
