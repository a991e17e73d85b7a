use anyhow::{bail, Context, Result};
use calamine::{open_workbook_auto, Data, Reader};
use serde_json::{Number, Value};
use std::path::Path;

use crate::domain::product::RawRecord;

/// Workbook formats the upload accepts.
pub const SUPPORTED_EXTENSIONS: [&str; 5] = ["xlsx", "xls", "xlsm", "xlsb", "ods"];

pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .is_some_and(|e| SUPPORTED_EXTENSIONS.contains(&e.as_str()))
}

/// Read the first sheet of a workbook into records keyed by its header row.
pub fn read_first_sheet(path: &Path) -> Result<Vec<RawRecord>> {
    if !is_supported(path) {
        bail!(
            "{} is not a spreadsheet (expected one of: {})",
            path.display(),
            SUPPORTED_EXTENSIONS.join(", ")
        );
    }
    let mut workbook = open_workbook_auto(path)
        .with_context(|| format!("Failed to open workbook: {}", path.display()))?;
    let Some(first) = workbook.sheet_names().first().cloned() else {
        return Ok(Vec::new());
    };
    let range = workbook
        .worksheet_range(&first)
        .with_context(|| format!("Failed to read sheet '{first}'"))?;

    let rows = range
        .rows()
        .map(|row| row.iter().map(cell_value).collect())
        .collect();
    Ok(records_from_rows(rows))
}

/// Turn a header row plus data rows into records.
///
/// Empty cells are left out of their record, rows with no value at all are
/// skipped, and columns without a header are ignored.
pub fn records_from_rows(rows: Vec<Vec<Value>>) -> Vec<RawRecord> {
    let mut rows = rows.into_iter();
    let Some(header) = rows.next() else {
        return Vec::new();
    };
    let header: Vec<Option<String>> = header
        .into_iter()
        .map(|h| match h {
            Value::Null => None,
            Value::String(s) if s.trim().is_empty() => None,
            Value::String(s) => Some(s.trim().to_string()),
            other => Some(other.to_string()),
        })
        .collect();

    rows.filter_map(|row| {
        let record: RawRecord = header
            .iter()
            .zip(row)
            .filter_map(|(name, cell)| match (name, cell) {
                (Some(_), Value::Null) | (None, _) => None,
                (Some(name), cell) => Some((name.clone(), cell)),
            })
            .collect();
        (!record.is_empty()).then_some(record)
    })
    .collect()
}

fn cell_value(cell: &Data) -> Value {
    match cell {
        Data::Empty => Value::Null,
        Data::String(s) if s.is_empty() => Value::Null,
        Data::String(s) => Value::String(s.clone()),
        Data::Int(i) => Value::Number(Number::from(*i)),
        Data::Float(f) => float_value(*f),
        Data::Bool(b) => Value::Bool(*b),
        Data::DateTime(dt) => float_value(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Value::String(s.clone()),
        Data::Error(e) => Value::String(format!("#{e:?}")),
    }
}

/// Whole floats become integers, the way spreadsheets display them.
fn float_value(f: f64) -> Value {
    if f.fract() == 0.0 && f.abs() < 9.0e15 {
        Value::Number(Number::from(f as i64))
    } else {
        Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
    }
}
