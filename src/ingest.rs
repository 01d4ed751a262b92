//! CSV ingest and export for [`Frame`]s.
//!
//! Column kinds are inferred from the full file: a column is `Integer` when
//! every cell parses as `i64` and none are missing, `Float` when every present
//! cell parses as `f64` (integer columns with gaps widen to `Float`), and
//! `String` otherwise. Dates stay textual here; the cleaner normalizes them.

use std::path::Path;

use anyhow::{Context, Result};
use encoding_rs::Encoding;
use log::debug;

use crate::{
    data::{ColumnType, Value},
    frame::{Column, Frame},
    io_utils,
};

#[derive(Debug, Clone)]
pub struct ReadOptions {
    pub delimiter: u8,
    pub encoding: &'static Encoding,
    /// Extra tokens treated as missing alongside the empty cell.
    pub na_values: Vec<String>,
}

impl ReadOptions {
    pub fn new(delimiter: u8, encoding: &'static Encoding) -> Self {
        Self {
            delimiter,
            encoding,
            na_values: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
struct TypeCandidate {
    possible_integer: bool,
    possible_float: bool,
    missing: bool,
}

impl TypeCandidate {
    fn new() -> Self {
        Self {
            possible_integer: true,
            possible_float: true,
            missing: false,
        }
    }

    fn observe(&mut self, cell: Option<&str>) {
        let Some(cell) = cell else {
            self.missing = true;
            return;
        };
        if self.possible_integer && cell.parse::<i64>().is_err() {
            self.possible_integer = false;
        }
        if self.possible_float && cell.parse::<f64>().is_err() {
            self.possible_float = false;
        }
    }

    fn decide(&self) -> ColumnType {
        if self.possible_integer && !self.missing {
            ColumnType::Integer
        } else if self.possible_float {
            ColumnType::Float
        } else {
            ColumnType::String
        }
    }
}

pub fn read_frame(path: &Path, options: &ReadOptions) -> Result<Frame> {
    let mut reader = io_utils::open_csv_reader_from_path(path, options.delimiter)?;
    let headers = io_utils::reader_headers(&mut reader, options.encoding)
        .with_context(|| format!("Reading headers from {path:?}"))?;

    let mut cells: Vec<Vec<Option<String>>> = vec![Vec::new(); headers.len()];
    for (idx, record) in reader.byte_records().enumerate() {
        let record = record.with_context(|| format!("Reading row {} of {path:?}", idx + 2))?;
        let decoded = io_utils::decode_record(&record, options.encoding)
            .with_context(|| format!("Decoding row {} of {path:?}", idx + 2))?;
        for (column, value) in cells.iter_mut().zip(decoded) {
            let trimmed = value.trim();
            if trimmed.is_empty() || options.na_values.iter().any(|na| na == trimmed) {
                column.push(None);
            } else {
                column.push(Some(value));
            }
        }
    }

    let mut frame = Frame::new();
    for (name, raw) in headers.into_iter().zip(cells) {
        let mut candidate = TypeCandidate::new();
        for cell in &raw {
            candidate.observe(cell.as_deref().map(str::trim));
        }
        let datatype = candidate.decide();
        debug!("Inferred column '{name}' as {datatype}");
        let values = raw
            .into_iter()
            .map(|cell| cell.map(|text| typed_cell(text, datatype)))
            .collect();
        frame
            .push_column(Column::new(name, datatype, values))
            .with_context(|| format!("Building frame from {path:?}"))?;
    }
    Ok(frame)
}

fn typed_cell(text: String, datatype: ColumnType) -> Value {
    let trimmed = text.trim();
    match datatype {
        ColumnType::Integer => trimmed
            .parse()
            .map(Value::Integer)
            .unwrap_or(Value::String(text)),
        ColumnType::Float => trimmed
            .parse()
            .map(Value::Float)
            .unwrap_or(Value::String(text)),
        ColumnType::DateTime | ColumnType::String => Value::String(text),
    }
}

/// Writes a frame as CSV; missing cells become empty fields.
pub fn write_frame(frame: &Frame, path: Option<&Path>, delimiter: u8) -> Result<usize> {
    let mut writer = io_utils::open_csv_writer(path, delimiter)?;
    writer
        .write_record(frame.headers())
        .context("Writing output headers")?;
    for idx in 0..frame.row_count() {
        let record = frame
            .row(idx)
            .into_iter()
            .map(|cell| cell.map(Value::as_display).unwrap_or_default())
            .collect::<Vec<_>>();
        writer
            .write_record(&record)
            .with_context(|| format!("Writing output row {}", idx + 2))?;
    }
    writer.flush().context("Flushing output writer")?;
    Ok(frame.row_count())
}
