//! Reading roster tables from Excel/ODS/CSV files and writing CSV exports.

use calamine::{open_workbook_auto, Data, Reader};
use serde_json::{Number, Value};
use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::core::schema::{Record, CLASS_COLUMN, NAME_COLUMN, STUDENT_ID_COLUMN};
use crate::core::{CoreError, CoreResult, RosterEntry};

/// File name suggested for the missing-submission export.
pub const MISSING_EXPORT_FILE_NAME: &str = "未提交作业学生名单.csv";

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Reads the first sheet of `path` into header-keyed rows.
///
/// The first row supplies the headers. Empty cells are left out of a row and
/// rows without any value are skipped, so the returned rows are numbered
/// without the blank ones. A roster issue in row 3 is the third non-blank
/// data row.
pub fn read_table(path: &Path) -> CoreResult<Vec<Record>> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    let rows = match extension.as_str() {
        "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => read_workbook(path)?,
        "csv" => read_csv(path)?,
        _ => return Err(CoreError::UnsupportedFormat(path.to_path_buf())),
    };
    tracing::info!("Read {} rows from {:?}", rows.len(), path);
    Ok(rows)
}

fn read_workbook(path: &Path) -> CoreResult<Vec<Record>> {
    let mut workbook = open_workbook_auto(path)
        .map_err(|e| CoreError::Spreadsheet(format!("Failed to open {:?}: {}", path, e)))?;

    let Some(sheet) = workbook.sheet_names().first().cloned() else {
        return Ok(Vec::new());
    };
    let range = workbook
        .worksheet_range(&sheet)
        .map_err(|e| CoreError::Spreadsheet(format!("Failed to read sheet {:?}: {}", sheet, e)))?;

    let mut rows = range.rows();
    let Some(header_row) = rows.next() else {
        return Ok(Vec::new());
    };
    let headers = normalize_headers(header_row.iter().map(|cell| match cell {
        Data::Empty => String::new(),
        other => other.to_string().trim().to_string(),
    }));

    Ok(rows
        .map(|row| {
            headers
                .iter()
                .zip(row.iter())
                .filter_map(|(header, cell)| cell_value(cell).map(|v| (header.clone(), v)))
                .collect::<Record>()
        })
        .filter(|record| !record.is_empty())
        .collect())
}

fn cell_value(cell: &Data) -> Option<Value> {
    match cell {
        Data::Empty => None,
        Data::String(s) if s.trim().is_empty() => None,
        Data::String(s) => Some(Value::String(s.clone())),
        Data::Int(i) => Some(Value::Number((*i).into())),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
            Some(Value::Number((*f as i64).into()))
        }
        Data::Float(f) => Number::from_f64(*f).map(Value::Number),
        Data::Bool(b) => Some(Value::Bool(*b)),
        other => Some(Value::String(other.to_string())),
    }
}

fn read_csv(path: &Path) -> CoreResult<Vec<Record>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| CoreError::Spreadsheet(format!("Failed to open {:?}: {}", path, e)))?;

    let raw_headers = reader
        .headers()
        .map_err(|e| CoreError::Spreadsheet(e.to_string()))?
        .clone();
    let headers = normalize_headers(
        raw_headers
            .iter()
            .enumerate()
            .map(|(i, h)| if i == 0 { h.trim_start_matches('\u{feff}') } else { h })
            .map(|h| h.trim().to_string()),
    );

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| CoreError::Spreadsheet(e.to_string()))?;
        let row: Record = headers
            .iter()
            .zip(record.iter())
            .filter(|(_, value)| !value.trim().is_empty())
            .map(|(header, value)| (header.clone(), Value::String(value.to_string())))
            .collect();
        if !row.is_empty() {
            rows.push(row);
        }
    }
    Ok(rows)
}

/// Names blank headers `__EMPTY`, `__EMPTY_1`, ... and suffixes repeats with `_1`, `_2`, ...
fn normalize_headers(raw: impl Iterator<Item = String>) -> Vec<String> {
    let mut headers: Vec<String> = Vec::new();
    let mut empty_count = 0;
    for header in raw {
        let base = if header.is_empty() {
            let name = if empty_count == 0 {
                "__EMPTY".to_string()
            } else {
                format!("__EMPTY_{}", empty_count)
            };
            empty_count += 1;
            name
        } else {
            header
        };

        let mut candidate = base.clone();
        let mut n = 1;
        while headers.contains(&candidate) {
            candidate = format!("{}_{}", base, n);
            n += 1;
        }
        headers.push(candidate);
    }
    headers
}

fn render_cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Writes `rows` to `path` as UTF-8 CSV with a BOM, columns in `headers` order.
pub fn write_table(rows: &[Record], headers: &[String], path: &Path) -> CoreResult<()> {
    let mut file = File::create(path).map_err(|e| CoreError::io(e, path))?;
    file.write_all(UTF8_BOM).map_err(|e| CoreError::io(e, path))?;

    let mut writer = csv::Writer::from_writer(file);
    writer
        .write_record(headers)
        .map_err(|e| CoreError::Spreadsheet(e.to_string()))?;
    for row in rows {
        writer
            .write_record(headers.iter().map(|h| render_cell(row.get(h))))
            .map_err(|e| CoreError::Spreadsheet(e.to_string()))?;
    }
    writer.flush().map_err(|e| CoreError::io(e, path))?;

    tracing::info!("Exported {} rows to {:?}", rows.len(), path);
    Ok(())
}

/// Exports `entries` with the 姓名/学号/班级 columns. Returns the row count.
pub fn export_roster(entries: &[RosterEntry], path: &Path) -> CoreResult<usize> {
    let headers = [NAME_COLUMN, STUDENT_ID_COLUMN, CLASS_COLUMN].map(String::from);
    let rows: Vec<Record> = entries
        .iter()
        .map(|entry| {
            let mut row = Record::new();
            row.insert(NAME_COLUMN.into(), Value::String(entry.name.clone()));
            row.insert(STUDENT_ID_COLUMN.into(), Value::String(entry.student_id.clone()));
            row.insert(CLASS_COLUMN.into(), Value::String(entry.class_name.clone()));
            row
        })
        .collect();
    write_table(&rows, &headers, path)?;
    Ok(rows.len())
}
