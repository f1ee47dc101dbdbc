//! Flat-to-nested reshaping of the merged table into invoice documents.
//!
//! Rows are grouped by `ft_id_factura` in order of first appearance. Header
//! fields come from the first row of each group; every row becomes one product
//! entry, in row order.

use std::collections::HashMap;

use clap::ValueEnum;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value as JsonValue};

use crate::{
    data::{Value, present},
    dataset::Dataset,
    error::EtlError,
};

pub const INVOICE_ID_COLUMN: &str = "ft_id_factura";

/// What to do when rows of one invoice disagree on a header field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[value(rename_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum HeaderPolicy {
    PickFirst,
    #[default]
    Warn,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvoiceHeader {
    pub id: JsonValue,
    #[serde(rename = "num_factura")]
    pub number: JsonValue,
    #[serde(rename = "año_factura")]
    pub year: JsonValue,
    #[serde(rename = "fecha_factura")]
    pub date: String,
    #[serde(rename = "total_iva_excl")]
    pub total_excl_vat: JsonValue,
    #[serde(rename = "tota_iva")]
    pub vat_total: JsonValue,
    #[serde(rename = "total_iva_incl")]
    pub total_incl_vat: JsonValue,
    #[serde(rename = "observaciones")]
    pub observations: JsonValue,
    #[serde(rename = "num_albaran")]
    pub delivery_note: JsonValue,
    #[serde(rename = "fecha_albaran")]
    pub delivery_note_date: String,
    #[serde(rename = "id_pedido")]
    pub order_id: JsonValue,
    #[serde(rename = "num_pedido")]
    pub order_number: JsonValue,
    #[serde(rename = "año_pedido")]
    pub order_year: JsonValue,
    #[serde(rename = "fecha_pedido")]
    pub order_date: String,
    #[serde(rename = "id_pedido_cliente")]
    pub customer_order_ref: JsonValue,
    #[serde(rename = "id_cliente")]
    pub client_id: JsonValue,
    #[serde(rename = "cliente")]
    pub client_name: JsonValue,
    #[serde(rename = "direccion")]
    pub address: JsonValue,
    #[serde(rename = "cod_postal")]
    pub postal_code: JsonValue,
    #[serde(rename = "ciudad")]
    pub city: JsonValue,
    #[serde(rename = "provincia")]
    pub province: JsonValue,
    #[serde(rename = "pais")]
    pub country: JsonValue,
    pub nif: JsonValue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Product {
    #[serde(rename = "id_articulo")]
    pub article_id: JsonValue,
    #[serde(rename = "descripcion")]
    pub description: JsonValue,
    #[serde(rename = "cantidad")]
    pub quantity: JsonValue,
    #[serde(rename = "precio")]
    pub unit_price: JsonValue,
    #[serde(rename = "descuento")]
    pub discount: JsonValue,
    pub total: JsonValue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductEntry {
    pub product: Product,
}

/// One output document: the invoice header plus its product lines.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Invoice {
    #[serde(flatten)]
    pub header: InvoiceHeader,
    pub products: Vec<ProductEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InvoiceEnvelope<'a> {
    #[serde(rename = "factura")]
    pub invoice: &'a Invoice,
}

/// Combined-output document: `{"facturas": [{"factura": {...}}, ...]}`.
#[derive(Debug, Clone, Serialize)]
pub struct InvoiceCollection<'a> {
    #[serde(rename = "facturas")]
    pub invoices: Vec<InvoiceEnvelope<'a>>,
}

impl<'a> InvoiceCollection<'a> {
    pub fn new(invoices: &'a [Invoice]) -> Self {
        Self {
            invoices: invoices
                .iter()
                .map(|invoice| InvoiceEnvelope { invoice })
                .collect(),
        }
    }
}

impl Invoice {
    /// Token used to name this invoice's output file: `<number>_<year>`, or
    /// the invoice id when either part is missing. Restricted to
    /// `[A-Za-z0-9_-]`.
    pub fn reference(&self) -> String {
        let raw = match (
            json_token(&self.header.number),
            json_token(&self.header.year),
        ) {
            (Some(number), Some(year)) => format!("{number}_{year}"),
            _ => json_token(&self.header.id).unwrap_or_else(|| "unknown".to_string()),
        };
        raw.chars()
            .map(|c| match c {
                'a'..='z' | 'A'..='Z' | '0'..='9' | '_' | '-' => c,
                _ => '_',
            })
            .collect()
    }
}

fn json_token(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::Null => None,
        JsonValue::String(s) if s.trim().is_empty() => None,
        JsonValue::String(s) => Some(s.trim().to_string()),
        JsonValue::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() && f.fract() == 0.0 => Some(format!("{}", f as i64)),
            _ => Some(n.to_string()),
        },
        other => Some(other.to_string()),
    }
}

/// Converts a cell into the JSON value written to the document. Integers and
/// floats map to JSON numbers, a missing cell or NaN to `null`, dates to ISO
/// text and everything else passes through.
pub fn convert_to_native(value: Option<&Value>) -> JsonValue {
    let Some(value) = present(value) else {
        return JsonValue::Null;
    };
    match value {
        Value::Integer(i) => JsonValue::Number(Number::from(*i)),
        Value::Float(f) => Number::from_f64(*f).map_or(JsonValue::Null, JsonValue::Number),
        Value::String(s) => JsonValue::String(s.clone()),
        Value::Boolean(b) => JsonValue::Bool(*b),
        Value::Date(d) => JsonValue::String(d.format("%Y-%m-%d").to_string()),
        Value::DateTime(dt) => JsonValue::String(dt.format("%Y-%m-%dT%H:%M:%S").to_string()),
    }
}

/// Renders a date-like cell as `YYYY-MM-DD`. Missing cells become `""` and text
/// is cut at the first space, dropping any time of day.
pub fn format_date(value: Option<&Value>) -> String {
    let Some(value) = present(value) else {
        return String::new();
    };
    match value {
        Value::Date(d) => d.format("%Y-%m-%d").to_string(),
        Value::DateTime(dt) => dt.format("%Y-%m-%d").to_string(),
        Value::String(s) if s.contains(' ') => {
            s.split_whitespace().next().unwrap_or_default().to_string()
        }
        other => other.as_display(),
    }
}

struct RowView<'a> {
    dataset: &'a Dataset,
    row: usize,
}

impl RowView<'_> {
    fn native(&self, column: &str) -> JsonValue {
        convert_to_native(self.dataset.cell(self.row, column))
    }

    fn date(&self, column: &str) -> String {
        format_date(self.dataset.cell(self.row, column))
    }

    fn header(&self) -> InvoiceHeader {
        let observations = if self.dataset.has_column("ft_observaciones") {
            self.native("ft_observaciones")
        } else {
            JsonValue::String(String::new())
        };
        InvoiceHeader {
            id: self.native("ft_id_factura"),
            number: self.native("ft_numfactura"),
            year: self.native("ft_ano_numeracion"),
            date: self.date("ft_fecha_factura"),
            total_excl_vat: self.native("ft_total"),
            vat_total: self.native("ft_ivatotal"),
            total_incl_vat: self.native("ft_totaliva"),
            observations,
            delivery_note: self.native("lpd_albaran"),
            delivery_note_date: self.date("lpd_fecha_albaran"),
            order_id: self.native("pd_id_pedido"),
            order_number: self.native("pd_numpedido"),
            order_year: self.native("pd_ano_numeracion"),
            order_date: self.date("pd_fecha_pedido"),
            customer_order_ref: self.native("pd_pedido_cliente"),
            client_id: self.native("cte_id_cliente"),
            client_name: self.native("cte_cliente"),
            address: self.native("cte_direccion"),
            postal_code: self.native("cte_codigo_postal"),
            city: self.native("cte_ciudad"),
            province: self.native("cte_provincia"),
            country: self.native("cte_pais"),
            nif: self.native("cte_nif"),
        }
    }

    fn product(&self) -> ProductEntry {
        ProductEntry {
            product: Product {
                article_id: self.native("lpd_id_articulo"),
                description: self.native("lpd_descripcion_linea"),
                quantity: self.native("lpd_cantidad"),
                unit_price: self.native("lpd_precio_euros"),
                discount: self.native("lpd_descuento_linea"),
                total: self.native("lpd_total"),
            },
        }
    }
}

/// Groups the merged table by invoice id and builds one [`Invoice`] per group.
pub fn transform(table: &Dataset, policy: HeaderPolicy) -> Result<Vec<Invoice>, EtlError> {
    info!("Starting transformation process");
    let id_idx = table.column_index(INVOICE_ID_COLUMN).ok_or_else(|| {
        EtlError::Transform(format!("column '{INVOICE_ID_COLUMN}' is not in the merged table"))
    })?;

    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<Vec<usize>> = Vec::new();
    for (row_idx, row) in table.rows.iter().enumerate() {
        let key = present(row[id_idx].as_ref())
            .map(Value::as_display)
            .ok_or_else(|| EtlError::MissingInvoiceId { row: row_idx + 1 })?;
        match positions.get(&key).copied() {
            Some(group) => groups[group].push(row_idx),
            None => {
                positions.insert(key, groups.len());
                groups.push(vec![row_idx]);
            }
        }
    }
    info!("Found {} unique invoices to process", groups.len());

    let mut invoices = Vec::with_capacity(groups.len());
    for rows in &groups {
        let first = RowView {
            dataset: table,
            row: rows[0],
        };
        let header = first.header();
        if policy != HeaderPolicy::PickFirst {
            check_header_consistency(table, rows, &header, policy)?;
        }
        let products = rows
            .iter()
            .map(|row| RowView { dataset: table, row: *row }.product())
            .collect::<Vec<_>>();
        debug!(
            "Processed invoice {} with {} products",
            header.id,
            products.len()
        );
        invoices.push(Invoice { header, products });
    }

    info!(
        "Transformation successful: built {} invoice documents",
        invoices.len()
    );
    Ok(invoices)
}

fn check_header_consistency(
    table: &Dataset,
    rows: &[usize],
    first: &InvoiceHeader,
    policy: HeaderPolicy,
) -> Result<(), EtlError> {
    let baseline = header_fields(first)?;
    for row in &rows[1..] {
        let header = RowView { dataset: table, row: *row }.header();
        if header == *first {
            continue;
        }
        let fields = header_fields(&header)?;
        let field = baseline
            .iter()
            .zip(fields.iter())
            .find(|((_, a), (_, b))| a != b)
            .map(|((name, _), _)| name.clone())
            .unwrap_or_default();
        let invoice = json_token(&first.id).unwrap_or_default();
        match policy {
            HeaderPolicy::Fail => return Err(EtlError::HeaderConflict { invoice, field }),
            _ => warn!(
                "Invoice {invoice}: header field '{field}' differs on merged row {}; keeping the first row's value",
                row + 1
            ),
        }
    }
    Ok(())
}

/// Header fields by output key, in declaration order (`preserve_order` keeps
/// the serialized map from sorting them).
fn header_fields(header: &InvoiceHeader) -> Result<Vec<(String, JsonValue)>, EtlError> {
    match serde_json::to_value(header) {
        Ok(JsonValue::Object(map)) => Ok(map.into_iter().collect()),
        Ok(_) => Err(EtlError::Transform(
            "invoice header did not serialize to an object".to_string(),
        )),
        Err(err) => Err(EtlError::Transform(err.to_string())),
    }
}
