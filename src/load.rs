//! JSON persistence of invoice documents.
//!
//! The output contract is chosen explicitly through [`OutputMode`]:
//!
//! - `per-invoice`: one file per invoice; the `placeholder` token in the path
//!   template is replaced by [`Invoice::reference`] and the file holds the
//!   invoice object itself.
//! - `combined`: one file holding `{"facturas": [{"factura": {...}}, ...]}`;
//!   a `placeholder` token in the path becomes `facturas`.
//!
//! Files are UTF-8, pretty-printed with four-space indentation, non-ASCII text
//! unescaped, and overwritten unconditionally.

use std::{
    collections::HashSet,
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use clap::ValueEnum;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use crate::{
    error::EtlError,
    transform::{Invoice, InvoiceCollection},
};

pub const PLACEHOLDER_TOKEN: &str = "placeholder";
const COMBINED_REFERENCE: &str = "facturas";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[value(rename_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum OutputMode {
    #[default]
    PerInvoice,
    Combined,
}

#[derive(Debug)]
pub struct WriteFailure {
    pub reference: String,
    pub error: EtlError,
}

#[derive(Debug, Default)]
pub struct LoadReport {
    pub written: Vec<PathBuf>,
    pub failures: Vec<WriteFailure>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Writes `invoices` under `template`. Only a failure to prepare the output
/// directory is returned as an error; per-file failures are collected in the
/// report and do not stop the remaining writes.
pub fn load(
    invoices: &[Invoice],
    template: &Path,
    mode: OutputMode,
) -> Result<LoadReport, EtlError> {
    prepare_output_dir(template)?;
    info!("Starting to save {} processed invoices", invoices.len());
    let report = match mode {
        OutputMode::PerInvoice => write_per_invoice(invoices, template),
        OutputMode::Combined => write_combined(invoices, template),
    };
    for failure in &report.failures {
        error!(
            "Error saving invoice {}: {}",
            failure.reference,
            failure_source(&failure.error)
        );
    }
    Ok(report)
}

fn failure_source(error: &EtlError) -> String {
    use std::error::Error as _;
    match error.source() {
        Some(source) => format!("{error}: {source}"),
        None => error.to_string(),
    }
}

fn prepare_output_dir(template: &Path) -> Result<(), EtlError> {
    let Some(dir) = template.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return Ok(());
    };
    fs::create_dir_all(dir).map_err(|source| EtlError::Write {
        path: dir.to_path_buf(),
        source,
    })
}

/// Substitutes every `placeholder` token in the file name part of `template`.
pub fn resolve_output_path(template: &Path, reference: &str) -> PathBuf {
    match template.file_name().and_then(|name| name.to_str()) {
        Some(name) => template.with_file_name(name.replace(PLACEHOLDER_TOKEN, reference)),
        None => template.to_path_buf(),
    }
}

fn write_per_invoice(invoices: &[Invoice], template: &Path) -> LoadReport {
    let mut report = LoadReport::default();
    let templated = template
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.contains(PLACEHOLDER_TOKEN));
    if !templated && invoices.len() > 1 {
        warn!(
            "Output path {} has no '{PLACEHOLDER_TOKEN}' token; every invoice overwrites the same file",
            template.display()
        );
    }
    let mut seen = HashSet::new();
    for invoice in invoices {
        let reference = invoice.reference();
        if !seen.insert(reference.clone()) {
            warn!("Invoice reference '{reference}' produced more than once; the later file overwrites the earlier one");
        }
        let path = resolve_output_path(template, &reference);
        match write_json(&path, invoice, &reference) {
            Ok(bytes) => {
                log_saved(&path, bytes);
                report.written.push(path);
            }
            Err(error) => report.failures.push(WriteFailure { reference, error }),
        }
    }
    report
}

fn write_combined(invoices: &[Invoice], template: &Path) -> LoadReport {
    let mut report = LoadReport::default();
    let path = resolve_output_path(template, COMBINED_REFERENCE);
    let collection = InvoiceCollection::new(invoices);
    match write_json(&path, &collection, COMBINED_REFERENCE) {
        Ok(bytes) => {
            log_saved(&path, bytes);
            report.written.push(path);
        }
        Err(error) => report.failures.push(WriteFailure {
            reference: COMBINED_REFERENCE.to_string(),
            error,
        }),
    }
    report
}

fn log_saved(path: &Path, bytes: u64) {
    let megabytes = bytes as f64 / (1024.0 * 1024.0);
    info!("File saved successfully: {} ({megabytes:.2} MB)", path.display());
}

/// Serializes `value` as four-space indented JSON, returning the file size.
pub fn write_json<T>(path: &Path, value: &T, reference: &str) -> Result<u64, EtlError>
where
    T: Serialize + ?Sized,
{
    let write_error = |source: std::io::Error| EtlError::Write {
        path: path.to_path_buf(),
        source,
    };
    let file = File::create(path).map_err(write_error)?;
    let mut writer = BufWriter::new(file);
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut writer, formatter);
    value
        .serialize(&mut serializer)
        .map_err(|source| EtlError::Serialize {
            reference: reference.to_string(),
            source,
        })?;
    writer.flush().map_err(write_error)?;
    let metadata = fs::metadata(path).map_err(write_error)?;
    Ok(metadata.len())
}
