//! Extraction of the four source categories.
//!
//! Each category carries its own filter/derive rules, selected by the
//! [`Category`] tag rather than by probing which columns a file happens to
//! contain. Column names are normalized last, so the rules address the
//! headers exactly as the ERP exports them.

use std::{fmt, path::Path};

use clap::ValueEnum;
use log::{debug, info, warn};

use crate::{
    data::{Value, normalize_header, present},
    dataset::{Cell, Dataset},
    error::EtlError,
    io_utils::{self, ReadOptions},
};

pub const QUANTITY: &str = "Cantidad";
pub const ORDER_DATE: &str = "Fecha Pedido";
pub const INVOICE_DATE: &str = "Fecha Factura";
pub const ORDER_YEAR: &str = "Año numeracion pedido";
pub const INVOICE_YEAR: &str = "Año numeracion factura";
pub const INVOICE_SERIES: &str = "Serie Factura";
pub const ORDER_SERIES: &str = "Serie";
pub const CUSTOMER_ORDER: &str = "Pedido Cliente";
pub const OBSERVATIONS: &str = "Observaciones";

/// Series 0 is the canonical numbering series; every other series is skipped.
const CANONICAL_SERIES: f64 = 0.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
#[value(rename_all = "kebab-case")]
pub enum Category {
    Invoices,
    Clients,
    OrderLines,
    Orders,
}

impl Category {
    pub fn prefix(self) -> &'static str {
        match self {
            Category::Invoices => "ft",
            Category::Clients => "cte",
            Category::OrderLines => "lpd",
            Category::Orders => "pd",
        }
    }

    /// Directory name under the data root.
    pub fn dir_name(self) -> &'static str {
        match self {
            Category::Invoices => "facturas",
            Category::Clients => "clientes",
            Category::OrderLines => "lineas_pedidos",
            Category::Orders => "pedidos",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Category::Invoices => "invoices",
            Category::Clients => "clients",
            Category::OrderLines => "order-lines",
            Category::Orders => "orders",
        };
        f.write_str(label)
    }
}

/// Locates, reads and normalizes one category's dataset.
pub fn extract(
    directory: &Path,
    category: Category,
    options: &ReadOptions,
) -> Result<Dataset, EtlError> {
    let path = io_utils::find_source_file(directory)?;
    info!("Reading file: {}", path.display());
    let raw = io_utils::read_dataset(&path, options)?;
    let dataset = prepare(raw, category)?;
    info!(
        "Successfully extracted {} data from {}: {} rows",
        category,
        path.file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default(),
        dataset.len()
    );
    Ok(dataset)
}

/// Applies the category rules to an already-read dataset and normalizes its
/// headers with the category prefix.
pub fn prepare(mut dataset: Dataset, category: Category) -> Result<Dataset, EtlError> {
    match category {
        Category::OrderLines => prepare_order_lines(&mut dataset)?,
        Category::Invoices => keep_canonical_series(&mut dataset, category, INVOICE_SERIES)?,
        Category::Orders => prepare_orders(&mut dataset)?,
        Category::Clients => {}
    }
    normalize_columns(&mut dataset, category.prefix())?;
    Ok(dataset)
}

fn require_column(dataset: &Dataset, category: Category, column: &str) -> Result<usize, EtlError> {
    dataset
        .column_index(column)
        .ok_or_else(|| EtlError::MissingColumn {
            category,
            column: column.to_string(),
        })
}

fn prepare_order_lines(dataset: &mut Dataset) -> Result<(), EtlError> {
    debug!("Processing order-line data");
    let quantity = require_column(dataset, Category::OrderLines, QUANTITY)?;
    let before = dataset.len();
    dataset.retain_rows(|row| {
        present(row[quantity].as_ref())
            .and_then(Value::as_f64)
            .is_some_and(|q| q > 0.0)
    });
    debug!(
        "Dropped {} order-line row(s) without a positive quantity",
        before - dataset.len()
    );

    for (date_column, year_column) in [(ORDER_DATE, ORDER_YEAR), (INVOICE_DATE, INVOICE_YEAR)] {
        let Some(idx) = dataset.column_index(date_column) else {
            warn!("Order-line column '{date_column}' is absent; '{year_column}' not derived");
            continue;
        };
        let parsed: Vec<Cell> = dataset
            .rows
            .iter()
            .map(|row| {
                present(row[idx].as_ref())
                    .and_then(Value::to_datetime)
                    .map(Value::DateTime)
            })
            .collect();
        let years: Vec<Cell> = parsed
            .iter()
            .map(|cell| {
                cell.as_ref()
                    .and_then(Value::year)
                    .map(|y| Value::Integer(i64::from(y)))
            })
            .collect();
        dataset.set_column(date_column, parsed);
        dataset.set_column(year_column, years);
    }
    debug!("Added numbering-year columns to order-line data");
    Ok(())
}

fn keep_canonical_series(
    dataset: &mut Dataset,
    category: Category,
    series_column: &str,
) -> Result<(), EtlError> {
    let series = require_column(dataset, category, series_column)?;
    debug!("Filtering {category} by {series_column} = 0");
    dataset.retain_rows(|row| {
        present(row[series].as_ref())
            .and_then(Value::as_f64)
            .is_some_and(|s| s == CANONICAL_SERIES)
    });
    Ok(())
}

fn prepare_orders(dataset: &mut Dataset) -> Result<(), EtlError> {
    keep_canonical_series(dataset, Category::Orders, ORDER_SERIES)?;
    let (Some(reference), Some(observations)) = (
        dataset.column_index(CUSTOMER_ORDER),
        dataset.column_index(OBSERVATIONS),
    ) else {
        warn!("Orders lack '{CUSTOMER_ORDER}' or '{OBSERVATIONS}'; reference fallback skipped");
        return Ok(());
    };
    let mut filled = 0usize;
    for row in dataset.rows.iter_mut() {
        let reference_empty = row[reference].as_ref().is_none_or(Value::is_blank);
        let has_observations = row[observations].as_ref().is_some_and(|v| !v.is_blank());
        if reference_empty && has_observations {
            row[reference] = row[observations].clone();
            filled += 1;
        }
    }
    debug!("Filled {filled} empty customer order reference(s) from observations");
    Ok(())
}

fn normalize_columns(dataset: &mut Dataset, prefix: &str) -> Result<(), EtlError> {
    dataset.rename_columns(|header| normalize_header(header, prefix));
    let mut seen = std::collections::HashSet::new();
    for column in &dataset.columns {
        if !seen.insert(column.as_str()) {
            return Err(EtlError::DuplicateColumn {
                column: column.clone(),
            });
        }
    }
    Ok(())
}
