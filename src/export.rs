//! CSV export of generated metadata.
//!
//! One header row (`Filename,Title,Description,Keywords,Rating`) followed by
//! one row per successful item. Fields containing a quote, comma or line
//! break are quoted with embedded quotes doubled (RFC 4180). Rows end in
//! CRLF so spreadsheet tools open the file without complaint.

use std::path::Path;

use serde::Serialize;
use tracing::info;

use crate::metadata::GenerationResult;
use crate::queue::{ItemStatus, QueueItem};

pub const HEADER: [&str; 5] = ["Filename", "Title", "Description", "Keywords", "Rating"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportRow {
    pub filename: String,
    pub title: String,
    pub description: String,
    pub keywords: String,
    pub rating: u8,
}

impl ExportRow {
    pub fn from_result(filename: impl Into<String>, result: &GenerationResult) -> Self {
        Self {
            filename: filename.into(),
            title: result.title.clone(),
            description: result.description.clone(),
            keywords: result.keywords.joined(),
            rating: result.rating,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("failed to write CSV file: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed CSV at line {line}: {reason}")]
    Malformed { line: usize, reason: String },
}

/// Rows for every successful item, in queue order.
pub fn rows_from_items(items: &[QueueItem]) -> Vec<ExportRow> {
    items
        .iter()
        .filter(|item| item.status == ItemStatus::Success)
        .filter_map(|item| {
            item.result
                .as_ref()
                .map(|result| ExportRow::from_result(item.file.name.clone(), result))
        })
        .collect()
}

fn escape(field: &str) -> String {
    if field.contains(['"', ',', '\r', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

pub fn to_csv(rows: &[ExportRow]) -> String {
    let mut out = HEADER.join(",");
    out.push_str("\r\n");
    for row in rows {
        let rating = row.rating.to_string();
        let fields = [
            row.filename.as_str(),
            row.title.as_str(),
            row.description.as_str(),
            row.keywords.as_str(),
            rating.as_str(),
        ];
        let line: Vec<String> = fields.iter().map(|f| escape(f)).collect();
        out.push_str(&line.join(","));
        out.push_str("\r\n");
    }
    out
}

pub async fn write_csv(path: &Path, rows: &[ExportRow]) -> Result<(), ExportError> {
    tokio::fs::write(path, to_csv(rows)).await?;
    info!(path = %path.display(), rows = rows.len(), "[EXPORT] Wrote CSV");
    Ok(())
}

/// Reads back a file produced by [`to_csv`]. Accepts LF or CRLF line ends.
pub fn parse_csv(input: &str) -> Result<Vec<ExportRow>, ExportError> {
    let records = split_records(input)?;
    let mut records = records.into_iter();
    match records.next() {
        Some((_, header)) if header == HEADER => {}
        Some((line, _)) => {
            return Err(ExportError::Malformed {
                line,
                reason: "unexpected header".to_string(),
            })
        }
        None => return Ok(Vec::new()),
    }

    records
        .map(|(line, fields)| {
            let [filename, title, description, keywords, rating]: [String; 5] =
                fields.try_into().map_err(|f: Vec<String>| ExportError::Malformed {
                    line,
                    reason: format!("expected 5 fields, found {}", f.len()),
                })?;
            let rating = rating.trim().parse().map_err(|_| ExportError::Malformed {
                line,
                reason: format!("rating '{rating}' is not a number"),
            })?;
            Ok(ExportRow {
                filename,
                title,
                description,
                keywords,
                rating,
            })
        })
        .collect()
}

/// Splits input into records of fields, tagged with the line each record starts on.
fn split_records(input: &str) -> Result<Vec<(usize, Vec<String>)>, ExportError> {
    let mut records = Vec::new();
    let mut fields: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut line = 1;
    let mut record_line = 1;
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                '\n' => {
                    line += 1;
                    field.push(c);
                }
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' if field.is_empty() => in_quotes = true,
            ',' => fields.push(std::mem::take(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                fields.push(std::mem::take(&mut field));
                records.push((record_line, std::mem::take(&mut fields)));
                line += 1;
                record_line = line;
            }
            _ => field.push(c),
        }
    }
    if in_quotes {
        return Err(ExportError::Malformed {
            line: record_line,
            reason: "unterminated quoted field".to_string(),
        });
    }
    if !field.is_empty() || !fields.is_empty() {
        fields.push(field);
        records.push((record_line, fields));
    }
    Ok(records)
}
