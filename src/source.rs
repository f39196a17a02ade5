//! Source readers: CSV exports and spreadsheet workbooks into [`Frame`]s.
//!
//! Readers do no cleanup beyond turning blank cells into nulls. CSV cells
//! are kept as text (or inferred, for files this crate wrote itself);
//! spreadsheet cells keep the type the workbook stored.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use calamine::{Data, Reader, open_workbook_auto};
use encoding_rs::Encoding;
use log::debug;

use crate::{
    data::{Cell, DateOrder, Value, infer_value, parse_datetime},
    error::PipelineError,
    frame::Frame,
    io_utils,
};

pub const SPREADSHEET_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xls", "ods"];
pub const CSV_EXTENSIONS: &[&str] = &["csv", "tsv"];

/// How raw CSV text becomes cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellMode {
    /// Keep every non-blank cell as text.
    Text,
    /// Narrow each cell to integer, float or timestamp where it parses.
    Inferred,
}

/// Table name for a file: its stem.
pub fn table_name(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string()
}

pub fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|e| ext.eq_ignore_ascii_case(e)))
}

/// Files in `dir` with one of `extensions`, sorted by name.
pub fn list_tables(dir: &Path, extensions: &[&str]) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(PipelineError::missing_input(dir).into());
    }
    let mut paths = fs::read_dir(dir)
        .with_context(|| format!("Listing {dir:?}"))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && has_extension(path, extensions))
        .collect::<Vec<_>>();
    paths.sort();
    Ok(paths)
}

/// Reads a table by extension: spreadsheets through the workbook reader,
/// anything else as CSV text.
pub fn read_table(path: &Path, encoding: &'static Encoding) -> Result<Frame> {
    if !path.exists() {
        return Err(PipelineError::missing_input(path).into());
    }
    if has_extension(path, SPREADSHEET_EXTENSIONS) {
        read_spreadsheet(path)
    } else {
        read_csv(path, encoding, CellMode::Text)
    }
}

pub fn read_csv(path: &Path, encoding: &'static Encoding, mode: CellMode) -> Result<Frame> {
    let mut reader = io_utils::open_csv_reader(path)?;
    let headers = io_utils::reader_headers(&mut reader, encoding)
        .with_context(|| format!("Reading headers of {path:?}"))?;
    let width = headers.len();
    let mut frame = Frame::new(table_name(path), headers);

    for (row_idx, record) in reader.byte_records().enumerate() {
        let record = record.with_context(|| format!("Reading row {} of {path:?}", row_idx + 2))?;
        let decoded = io_utils::decode_record(&record, encoding)
            .with_context(|| format!("Decoding row {} of {path:?}", row_idx + 2))?;
        let mut row = decoded
            .into_iter()
            .map(|raw| match mode {
                CellMode::Text => text_cell(raw),
                CellMode::Inferred => infer_value(&raw),
            })
            .collect::<Vec<_>>();
        row.resize(width, None);
        frame.push_row(row)?;
    }
    debug!("Read {} row(s) from {path:?}", frame.len());
    Ok(frame)
}

fn text_cell(raw: String) -> Cell {
    if raw.trim().is_empty() {
        None
    } else {
        Some(Value::String(raw))
    }
}

/// Reads the first worksheet; its first row is the header.
pub fn read_spreadsheet(path: &Path) -> Result<Frame> {
    let mut workbook =
        open_workbook_auto(path).with_context(|| format!("Opening workbook {path:?}"))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| anyhow!("Workbook {path:?} has no worksheets"))?
        .with_context(|| format!("Reading first worksheet of {path:?}"))?;

    let mut rows = range.rows();
    let Some(header_row) = rows.next() else {
        return Ok(Frame::new(table_name(path), Vec::new()));
    };
    let headers = header_row
        .iter()
        .enumerate()
        .map(|(idx, cell)| match cell {
            Data::Empty => format!("column_{}", idx + 1),
            other => other.to_string().trim().to_string(),
        })
        .collect::<Vec<_>>();
    let width = headers.len();
    let mut frame = Frame::new(table_name(path), headers);

    for row in rows {
        let mut cells = row.iter().map(spreadsheet_cell).collect::<Vec<_>>();
        cells.resize(width, None);
        if cells.iter().all(Option::is_none) {
            continue;
        }
        frame.push_row(cells)?;
    }
    debug!("Read {} row(s) from workbook {path:?}", frame.len());
    Ok(frame)
}

fn spreadsheet_cell(cell: &Data) -> Cell {
    match cell {
        Data::Empty | Data::Error(_) => None,
        Data::Int(i) => Some(Value::Integer(*i)),
        Data::Float(f) => Some(Value::Float(*f)),
        Data::Bool(b) => Some(Value::String(b.to_string())),
        Data::String(s) => text_cell(s.clone()),
        Data::DateTime(dt) => dt.as_datetime().map(Value::DateTime),
        Data::DateTimeIso(s) => parse_datetime(s, DateOrder::MonthFirst)
            .map(Value::DateTime)
            .or_else(|| text_cell(s.clone())),
        Data::DurationIso(s) => text_cell(s.clone()),
    }
}

/// Writes `frame` as a UTF-8 CSV file.
pub fn write_csv(frame: &Frame, path: &Path) -> Result<()> {
    let mut writer = io_utils::open_csv_writer(path)?;
    writer
        .write_record(frame.columns())
        .with_context(|| format!("Writing header to {path:?}"))?;
    for row in frame.rows() {
        writer
            .write_record(
                row.iter()
                    .map(|cell| cell.as_ref().map(Value::as_display).unwrap_or_default()),
            )
            .with_context(|| format!("Writing row to {path:?}"))?;
    }
    writer
        .flush()
        .with_context(|| format!("Flushing {path:?}"))?;
    Ok(())
}
