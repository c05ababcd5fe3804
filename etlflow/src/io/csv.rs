//! Minimal RFC 4180 CSV codec for raw dataset files.
//!
//! The first record is the header. Empty fields and the usual missing-value
//! markers (`NA`, `N/A`, `NaN`, `null`, `None` and friends) decode to
//! [`Value::Null`]; every column gets the narrowest type that fits all of its cells
//! (integer, then float, then text).

use crate::core::{Dataset, Value};
use crate::errors::DatasetError;
use std::path::Path;

/// Reads a CSV file into a dataset.
pub fn read_csv_file(path: &Path, dataset_name: &str) -> Result<Dataset, CsvReadError> {
    let text = std::fs::read_to_string(path)?;
    Ok(parse_csv(&text, dataset_name)?)
}

/// Errors from [`read_csv_file`].
#[derive(Debug, thiserror::Error)]
pub enum CsvReadError {
    /// The file could not be read.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// The file is not valid CSV.
    #[error("{0}")]
    Parse(#[from] DatasetError),
}

impl From<CsvReadError> for crate::errors::StageError {
    fn from(err: CsvReadError) -> Self {
        match err {
            CsvReadError::Io(e) => e.into(),
            CsvReadError::Parse(e) => e.into(),
        }
    }
}

/// Parses CSV text into a dataset.
pub fn parse_csv(text: &str, dataset_name: &str) -> Result<Dataset, DatasetError> {
    let records = split_records(text, dataset_name)?;
    let mut records = records.into_iter();

    let Some((_, header)) = records.next() else {
        return Ok(Dataset::new(dataset_name, Vec::<String>::new()));
    };
    let header: Vec<String> = header
        .into_iter()
        .map(|f| f.unwrap_or_default().trim().to_string())
        .collect();

    let mut raw_rows: Vec<Vec<Option<String>>> = Vec::new();
    for (line, record) in records {
        if record.len() != header.len() {
            return Err(DatasetError::Csv {
                source_name: dataset_name.to_string(),
                line,
                reason: format!("expected {} fields, found {}", header.len(), record.len()),
            });
        }
        raw_rows.push(
            record
                .into_iter()
                .map(|field| field.filter(|f| !is_missing_marker(f)))
                .collect(),
        );
    }

    let kinds: Vec<ColumnKind> = (0..header.len())
        .map(|col| infer_kind(raw_rows.iter().filter_map(|row| row[col].as_deref())))
        .collect();

    let rows = raw_rows.into_iter().map(|row| {
        row.into_iter()
            .zip(&kinds)
            .map(|(field, kind)| field.map_or(Value::Null, |f| kind.decode(f)))
            .collect()
    });

    Dataset::from_rows(dataset_name, header, rows)
}

/// Renders a dataset as CSV text with a header row.
#[must_use]
pub fn write_csv(dataset: &Dataset) -> String {
    let mut out = String::new();
    push_record(&mut out, dataset.columns().iter().map(String::as_str));
    for row in dataset.rows() {
        let cells: Vec<String> = row.iter().map(ToString::to_string).collect();
        push_record(&mut out, cells.iter().map(String::as_str));
    }
    out
}

fn push_record<'a>(out: &mut String, fields: impl Iterator<Item = &'a str>) {
    for (i, field) in fields.enumerate() {
        if i > 0 {
            out.push(',');
        }
        if field.contains([',', '"', '\n', '\r']) {
            out.push('"');
            out.push_str(&field.replace('"', "\"\""));
            out.push('"');
        } else {
            out.push_str(field);
        }
    }
    out.push('\n');
}

/// Cell texts read as missing values.
const MISSING_MARKERS: &[&str] = &[
    "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN", "<NA>",
    "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

fn is_missing_marker(field: &str) -> bool {
    MISSING_MARKERS.contains(&field)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Int,
    Float,
    Text,
}

impl ColumnKind {
    fn decode(self, field: String) -> Value {
        match self {
            Self::Int => field.trim().parse().map_or(Value::Text(field), Value::Int),
            Self::Float => field.trim().parse().map_or(Value::Text(field), Value::Float),
            Self::Text => Value::Text(field),
        }
    }
}

fn infer_kind<'a>(fields: impl Iterator<Item = &'a str>) -> ColumnKind {
    let mut kind = ColumnKind::Int;
    for field in fields {
        let trimmed = field.trim();
        if kind == ColumnKind::Int && trimmed.parse::<i64>().is_err() {
            kind = ColumnKind::Float;
        }
        if kind == ColumnKind::Float && trimmed.parse::<f64>().is_err() {
            return ColumnKind::Text;
        }
    }
    kind
}

type Record = Vec<Option<String>>;

/// Splits text into records, returning each with its one-based starting line.
/// Blank lines are skipped.
fn split_records(text: &str, source_name: &str) -> Result<Vec<(usize, Record)>, DatasetError> {
    let mut records = Vec::new();
    let mut record: Record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut field_started = false;
    let mut line = 1;
    let mut record_line = 1;
    let mut chars = text.chars().peekable();

    let finish_field = |record: &mut Record, field: &mut String, started: &mut bool| {
        let value = std::mem::take(field);
        record.push(if value.is_empty() { None } else { Some(value) });
        *started = false;
    };

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
            '"' if !field_started => {
                in_quotes = true;
                field_started = true;
            }
            ',' => finish_field(&mut record, &mut field, &mut field_started),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' | '\r' => {
                let blank = record.is_empty() && !field_started && field.is_empty();
                if !blank {
                    finish_field(&mut record, &mut field, &mut field_started);
                    records.push((record_line, std::mem::take(&mut record)));
                }
                line += 1;
                record_line = line;
            }
            _ => {
                field_started = true;
                field.push(c);
            }
        }
    }

    if in_quotes {
        return Err(DatasetError::Csv {
            source_name: source_name.to_string(),
            line: record_line,
            reason: "unterminated quoted field".to_string(),
        });
    }
    if !record.is_empty() || field_started || !field.is_empty() {
        finish_field(&mut record, &mut field, &mut field_started);
        records.push((record_line, record));
    }

    Ok(records)
}
