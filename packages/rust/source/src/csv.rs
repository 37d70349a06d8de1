//! CSV schema and sample extraction for attached dataset files.
//!
//! Only the head of each file matters: column names, inferred column types,
//! and a handful of sample rows. Files arrive as raw bytes and are not
//! guaranteed to be UTF-8.

use kaggleingest_shared::{ColumnInfo, DatasetFileSchema, IngestError, Result};
use tracing::debug;

/// Maximum sample rows kept per file.
pub const MAX_SAMPLE_ROWS: usize = 10;

/// Parse the head of a CSV file into its schema and sample rows.
pub fn parse_csv_sample(filename: &str, bytes: &[u8]) -> Result<DatasetFileSchema> {
    let text = decode_bytes(bytes);
    let mut records = read_records(&text, MAX_SAMPLE_ROWS + 1);

    if records.is_empty() {
        return Err(IngestError::parse(format!("empty CSV file {filename:?}")));
    }

    let header = records.remove(0);
    if header.iter().all(|h| h.trim().is_empty()) {
        return Err(IngestError::parse(format!(
            "CSV file {filename:?} has a blank header row"
        )));
    }

    let width = header.len();
    let sample_rows: Vec<Vec<String>> = records
        .into_iter()
        .map(|mut row| {
            // Ragged rows are padded or trimmed to header width so every
            // sample row lines up with the column list.
            row.resize(width, String::new());
            row
        })
        .collect();

    let columns = header
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let values: Vec<&str> = sample_rows.iter().map(|r| r[i].as_str()).collect();
            ColumnInfo {
                name: name.trim().to_string(),
                dtype: infer_dtype(&values).to_string(),
            }
        })
        .collect();

    debug!(filename, columns = width, rows = sample_rows.len(), "parsed CSV sample");

    Ok(DatasetFileSchema {
        filename: filename.to_string(),
        columns,
        sample_rows,
    })
}

/// Decode file bytes to text. UTF-8 first; anything else falls back to
/// windows-1252, which also covers the latin-1 range.
fn decode_bytes(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            decoded.into_owned()
        }
    }
}

/// Read up to `max` CSV records. Quote-aware: commas and newlines inside
/// double quotes stay inside the field, and `""` escapes a literal quote.
fn read_records(text: &str, max: usize) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_quotes {
            match ch {
                '"' => {
                    if chars.peek() == Some(&'"') {
                        chars.next();
                        field.push('"');
                    } else {
                        in_quotes = false;
                    }
                }
                _ => field.push(ch),
            }
            continue;
        }

        match ch {
            '"' => in_quotes = true,
            ',' => {
                record.push(std::mem::take(&mut field));
            }
            '\r' => {}
            '\n' => {
                record.push(std::mem::take(&mut field));
                if !(record.len() == 1 && record[0].is_empty()) {
                    records.push(std::mem::take(&mut record));
                    if records.len() >= max {
                        return records;
                    }
                } else {
                    record.clear();
                }
            }
            _ => field.push(ch),
        }
    }

    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }
    records
}

/// Infer a column type from its sample values. Blank cells are ignored; a
/// column with no usable samples is a string.
fn infer_dtype(values: &[&str]) -> &'static str {
    let present: Vec<&str> = values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .collect();
    if present.is_empty() {
        return "string";
    }

    if present
        .iter()
        .all(|v| v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("false"))
    {
        return "boolean";
    }
    if present.iter().all(|v| v.parse::<i64>().is_ok()) {
        return "integer";
    }
    if present.iter().all(|v| v.parse::<f64>().is_ok()) {
        return "float";
    }
    "string"
}
