//! Source discovery and tabular readers.
//!
//! Every input in facturas-etl flows through this module:
//!
//! - **Discovery**: one recognized file per category directory, chosen as the
//!   lexicographically first name. Extra candidates are reported, Office lock
//!   files (`~$...`) and hidden files are ignored.
//! - **Workbooks**: `.xlsx`, `.xlsm`, `.xlsb`, `.xls` and `.ods` are read with
//!   `calamine`; the first worksheet's first row holds the headers.
//! - **Delimited text**: `.csv` and `.tsv` exports are decoded via
//!   `encoding_rs` and typed through [`crate::schema::infer_column_types`].

use std::{
    fs::{self, File},
    io::{BufReader, Read},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use calamine::{Data, Reader, open_workbook_auto};
use encoding_rs::{Encoding, UTF_8};
use itertools::Itertools;
use log::{debug, warn};

use crate::{
    data::{Value, parse_naive_date, parse_naive_datetime, parse_typed_value},
    dataset::{Dataset, Row},
    error::EtlError,
    schema::infer_column_types,
};

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';

const WORKBOOK_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xlsb", "xls", "ods"];
const DELIMITED_EXTENSIONS: &[&str] = &["csv", "tsv"];

#[derive(Debug, Clone, Copy)]
pub struct ReadOptions {
    pub delimiter: Option<u8>,
    pub encoding: &'static Encoding,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            delimiter: None,
            encoding: UTF_8,
        }
    }
}

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    if let Some(value) = label {
        Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'"))
    } else {
        Ok(UTF_8)
    }
}

pub fn resolve_input_delimiter(path: &Path, provided: Option<u8>) -> u8 {
    provided.unwrap_or_else(|| match extension_of(path).as_deref() {
        Some("tsv") => DEFAULT_TSV_DELIMITER,
        _ => DEFAULT_CSV_DELIMITER,
    })
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

pub fn is_supported_source(path: &Path) -> bool {
    let hidden = path
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with("~$") || name.starts_with('.'));
    if hidden {
        return false;
    }
    extension_of(path).is_some_and(|ext| {
        WORKBOOK_EXTENSIONS.contains(&ext.as_str()) || DELIMITED_EXTENSIONS.contains(&ext.as_str())
    })
}

/// Picks the source file for one category directory.
pub fn find_source_file(directory: &Path) -> Result<PathBuf, EtlError> {
    if !directory.is_dir() {
        return Err(EtlError::SourceNotFound {
            path: directory.to_path_buf(),
        });
    }
    let entries = fs::read_dir(directory).map_err(|err| EtlError::read(directory, err))?;
    let mut candidates = Vec::new();
    for entry in entries {
        let path = entry.map_err(|err| EtlError::read(directory, err))?.path();
        if path.is_file() && is_supported_source(&path) {
            candidates.push(path);
        }
    }
    candidates.sort();
    let Some(first) = candidates.first().cloned() else {
        return Err(EtlError::SourceEmpty {
            path: directory.to_path_buf(),
        });
    };
    if candidates.len() > 1 {
        warn!(
            "{} candidate files in {:?}; using {:?} and ignoring {}",
            candidates.len(),
            directory,
            first,
            candidates[1..].iter().map(|p| format!("{p:?}")).join(", ")
        );
    }
    Ok(first)
}

/// Reads any recognized source file into a [`Dataset`] with raw headers.
pub fn read_dataset(path: &Path, options: &ReadOptions) -> Result<Dataset, EtlError> {
    let ext = extension_of(path).unwrap_or_default();
    let result = if DELIMITED_EXTENSIONS.contains(&ext.as_str()) {
        read_delimited(path, options)
    } else {
        read_workbook(path)
    };
    result.map_err(|err| EtlError::read(path, err))
}

pub fn read_workbook(path: &Path) -> Result<Dataset> {
    let mut workbook =
        open_workbook_auto(path).with_context(|| format!("Opening workbook {path:?}"))?;
    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| anyhow!("Workbook {path:?} has no sheets"))?;
    debug!("Reading sheet '{sheet_name}' from {path:?}");
    let range = workbook
        .worksheet_range(&sheet_name)
        .with_context(|| format!("Reading sheet '{sheet_name}'"))?;

    let mut rows = range.rows();
    let Some(header_row) = rows.next() else {
        return Ok(Dataset::default());
    };
    let columns = header_row
        .iter()
        .enumerate()
        .map(|(idx, cell)| header_from_cell(idx, cell))
        .collect::<Vec<_>>();
    let rows = rows
        .map(|row| row.iter().map(value_from_cell).collect::<Row>())
        .collect::<Vec<_>>();
    let mut dataset = Dataset::from_rows(columns, rows);
    integral_floats_to_integers(&mut dataset);
    Ok(dataset)
}

/// Workbooks store every number as a float. A column whose present numbers
/// are all whole and fit in `i64` is turned back into integers, the way CSV
/// inference types it.
pub fn integral_floats_to_integers(dataset: &mut Dataset) {
    for idx in 0..dataset.columns.len() {
        let mut has_float = false;
        let integral = dataset.rows.iter().all(|row| match &row[idx] {
            None | Some(Value::Integer(_)) => true,
            Some(Value::Float(f)) => {
                has_float = true;
                f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64
            }
            Some(_) => false,
        });
        if !integral || !has_float {
            continue;
        }
        debug!("Workbook column '{}' holds whole numbers only", dataset.columns[idx]);
        for row in dataset.rows.iter_mut() {
            if let Some(Value::Float(f)) = row[idx] {
                row[idx] = Some(Value::Integer(f as i64));
            }
        }
    }
}

fn header_from_cell(idx: usize, cell: &Data) -> String {
    let text = match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        other => other.to_string(),
    };
    if text.is_empty() {
        format!("column_{}", idx + 1)
    } else {
        text
    }
}

fn value_from_cell(cell: &Data) -> Option<Value> {
    match cell {
        Data::Empty | Data::Error(_) => None,
        Data::Int(i) => Some(Value::Integer(*i)),
        Data::Float(f) => Some(Value::Float(*f)),
        Data::Bool(b) => Some(Value::Boolean(*b)),
        Data::String(s) if s.trim().is_empty() => None,
        Data::String(s) => Some(Value::String(s.clone())),
        Data::DateTime(dt) => dt.as_datetime().map(Value::DateTime),
        Data::DateTimeIso(s) => Some(
            parse_naive_datetime(s)
                .map(Value::DateTime)
                .or_else(|_| parse_naive_date(s).map(Value::Date))
                .unwrap_or_else(|_| Value::String(s.clone())),
        ),
        Data::DurationIso(s) => Some(Value::String(s.clone())),
    }
}

pub fn open_csv_reader<R>(reader: R, delimiter: u8) -> csv::Reader<R>
where
    R: Read,
{
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(true)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(false);
    builder.from_reader(reader)
}

pub fn read_delimited(path: &Path, options: &ReadOptions) -> Result<Dataset> {
    let delimiter = resolve_input_delimiter(path, options.delimiter);
    let file = File::open(path).with_context(|| format!("Opening input file {path:?}"))?;
    let mut reader = open_csv_reader(BufReader::new(file), delimiter);

    let headers = reader_headers(&mut reader, options.encoding)?;
    let headers = headers
        .into_iter()
        .enumerate()
        .map(|(idx, h)| {
            let trimmed = h.trim().trim_start_matches('\u{feff}').to_string();
            if trimmed.is_empty() {
                format!("column_{}", idx + 1)
            } else {
                trimmed
            }
        })
        .collect::<Vec<_>>();

    let mut raw_rows = Vec::new();
    for (row_idx, record) in reader.byte_records().enumerate() {
        let record = record.with_context(|| format!("Reading row {}", row_idx + 2))?;
        raw_rows.push(decode_record(&record, options.encoding)?);
    }

    let types = infer_column_types(headers.len(), &raw_rows);
    let mut rows = Vec::with_capacity(raw_rows.len());
    for (row_idx, raw) in raw_rows.iter().enumerate() {
        let typed = raw
            .iter()
            .zip(types.iter())
            .map(|(value, ty)| parse_typed_value(value, ty))
            .collect::<Result<Row>>()
            .with_context(|| format!("Typing row {}", row_idx + 2))?;
        rows.push(typed);
    }
    Ok(Dataset::from_rows(headers, rows))
}

pub fn decode_bytes(bytes: &[u8], encoding: &'static Encoding) -> Result<String> {
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        Err(anyhow!(
            "Failed to decode text with encoding {}",
            encoding.name()
        ))
    } else {
        Ok(text.into_owned())
    }
}

pub fn decode_record(record: &csv::ByteRecord, encoding: &'static Encoding) -> Result<Vec<String>> {
    record
        .iter()
        .map(|field| decode_bytes(field, encoding))
        .collect()
}

pub fn reader_headers<R>(
    reader: &mut csv::Reader<R>,
    encoding: &'static Encoding,
) -> Result<Vec<String>>
where
    R: Read,
{
    let headers = reader.byte_headers()?.clone();
    decode_record(&headers, encoding)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supported_sources_skip_lock_and_hidden_files() {
        assert!(is_supported_source(Path::new("data/facturas/export.XLSX")));
        assert!(is_supported_source(Path::new("data/facturas/export.csv")));
        assert!(!is_supported_source(Path::new("data/facturas/~$export.xlsx")));
        assert!(!is_supported_source(Path::new("data/facturas/.export.csv")));
        assert!(!is_supported_source(Path::new("data/facturas/notes.txt")));
    }

    #[test]
    fn whole_number_columns_become_integers() {
        let mut dataset = Dataset::from_rows(
            vec!["cantidad".into(), "precio".into(), "codigo".into(), "vacia".into()],
            vec![
                vec![Some(Value::Float(5.0)), Some(Value::Float(2.5)), Some(Value::Float(7.0)), None],
                vec![None, Some(Value::Float(1.0)), Some(Value::String("X-1".into())), None],
                vec![Some(Value::Integer(3)), Some(Value::Float(4.0)), Some(Value::Float(9.0)), None],
            ],
        );
        integral_floats_to_integers(&mut dataset);
        assert_eq!(dataset.rows[0][0], Some(Value::Integer(5)));
        assert_eq!(dataset.rows[1][0], None);
        assert_eq!(dataset.rows[2][0], Some(Value::Integer(3)));
        assert_eq!(dataset.rows[1][1], Some(Value::Float(1.0)));
        assert_eq!(dataset.rows[0][2], Some(Value::Float(7.0)));
        assert_eq!(dataset.rows[0][3], None);
    }

    #[test]
    fn resolve_input_delimiter_defaults_by_extension() {
        assert_eq!(resolve_input_delimiter(Path::new("a.tsv"), None), b'\t');
        assert_eq!(resolve_input_delimiter(Path::new("a.csv"), None), b',');
        assert_eq!(resolve_input_delimiter(Path::new("a.csv"), Some(b';')), b';');
    }

    #[test]
    fn resolve_encoding_accepts_known_labels() {
        assert_eq!(resolve_encoding(None).unwrap(), UTF_8);
        assert_eq!(
            resolve_encoding(Some("latin1")).unwrap().name(),
            "windows-1252"
        );
        assert!(resolve_encoding(Some("klingon")).is_err());
    }
}
