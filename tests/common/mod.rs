#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use facturas_etl::{config::PipelineConfig, extract::Category, logging::LogConfig};
use rust_xlsxwriter::{ExcelDateTime, Format, Workbook};
use tempfile::{TempDir, tempdir};

pub const INVOICES_CSV: &str = "\
Id Factura,NumFactura,Año Numeracion,Serie Factura,Fecha Factura,Total,IvaTotal,TotalIva,Observaciones,Id Cliente
100,15,2024,0,2024-02-01,100.5,21.1,121.6,Entrega urgente,7
101,16,2024,1,2024-02-02,50.0,10.5,60.5,Serie rectificativa,7
";

pub const CLIENTS_CSV: &str = "\
Id Cliente,Cliente,Direccion,Codigo Postal,Ciudad,Provincia,Pais,NIF
7,Ferretería López,Calle Mayor 1,08001,Barcelona,Barcelona,España,B12345678
";

pub const ORDER_LINES_CSV: &str = "\
Id Artículo,Descripcion Linea,Cantidad,Precio Euros,Descuento Linea,Total,Albaran,Fecha Albaran,Numero Pedido,Fecha Pedido,Factura,Fecha Factura
A-1,Tornillos M6,5,2.5,0,12.5,ALB-1,2024-01-20,50,2024-01-15,15,2024-02-01
A-2,Tuercas M6,0,1.0,0,0,ALB-1,2024-01-20,50,2024-01-15,15,2024-02-01
";

pub const ORDERS_CSV: &str = "\
Id Pedido,NumPedido,Año Numeracion,Serie,Fecha Pedido,Pedido Cliente,Observaciones
900,50,2024,0,2024-01-15,,PO-77
";

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` to `name`, creating parent directories as needed.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dirs");
        }
        fs::write(&path, contents).expect("write temp file contents");
        path
    }

    pub fn data_dir(&self) -> PathBuf {
        self.path().join("data")
    }

    /// Writes one CSV export into the directory of `category`.
    pub fn write_source(&self, category: Category, file_name: &str, contents: &str) -> PathBuf {
        self.write(&format!("data/{}/{file_name}", category.dir_name()), contents)
    }

    /// The single-invoice scenario: one canonical invoice, one client, one
    /// order and two order lines, the second with quantity 0.
    pub fn with_sample_sources(self) -> Self {
        self.write_source(Category::Invoices, "facturas.csv", INVOICES_CSV);
        self.write_source(Category::Clients, "clientes.csv", CLIENTS_CSV);
        self.write_source(Category::OrderLines, "lineas.csv", ORDER_LINES_CSV);
        self.write_source(Category::Orders, "pedidos.csv", ORDERS_CSV);
        self
    }

    /// Same scenario as [`Self::with_sample_sources`], with the order lines
    /// exported as a workbook instead of CSV.
    pub fn with_workbook_order_lines(self) -> Self {
        self.write_source(Category::Invoices, "facturas.csv", INVOICES_CSV);
        self.write_source(Category::Clients, "clientes.csv", CLIENTS_CSV);
        self.write_source(Category::Orders, "pedidos.csv", ORDERS_CSV);
        let dir = self.data_dir().join(Category::OrderLines.dir_name());
        fs::create_dir_all(&dir).expect("create order-lines dir");
        write_order_lines_workbook(&dir.join("lineas.xlsx"));
        self
    }

    pub fn output_dir(&self) -> PathBuf {
        self.path().join("output")
    }

    pub fn config(&self) -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.data_dir = self.data_dir();
        config.output.path = self.output_dir().join("factura_placeholder.json");
        config.logging = LogConfig {
            directory: self.path().join("logs"),
            ..LogConfig::default()
        };
        config
    }
}

pub fn read_json(path: &Path) -> serde_json::Value {
    let text = fs::read_to_string(path).expect("read json output");
    serde_json::from_str(&text).expect("parse json output")
}

pub enum Cell {
    Text(&'static str),
    Number(f64),
    Date(u16, u8, u8),
}

/// Writes a one-sheet workbook with a header row followed by `rows`.
pub fn write_workbook(path: &Path, headers: &[&str], rows: &[Vec<Cell>]) {
    let mut workbook = Workbook::new();
    let date_format = Format::new().set_num_format("yyyy-mm-dd");
    let sheet = workbook.add_worksheet();
    for (col, header) in headers.iter().enumerate() {
        sheet.write_string(0, col as u16, *header).expect("write header");
    }
    for (idx, row) in rows.iter().enumerate() {
        let r = idx as u32 + 1;
        for (col, cell) in row.iter().enumerate() {
            let c = col as u16;
            match cell {
                Cell::Text(text) => {
                    sheet.write_string(r, c, *text).expect("write text");
                }
                Cell::Number(value) => {
                    sheet.write_number(r, c, *value).expect("write number");
                }
                Cell::Date(year, month, day) => {
                    let date = ExcelDateTime::from_ymd(*year, *month, *day).expect("valid date");
                    sheet
                        .write_datetime_with_format(r, c, &date, &date_format)
                        .expect("write date");
                }
            }
        }
    }
    workbook.save(path).expect("save workbook");
}

/// The order lines of [`ORDER_LINES_CSV`] as an xlsx export.
pub fn write_order_lines_workbook(path: &Path) {
    use Cell::{Date, Number, Text};
    let headers = [
        "Id Artículo",
        "Descripcion Linea",
        "Cantidad",
        "Precio Euros",
        "Descuento Linea",
        "Total",
        "Albaran",
        "Fecha Albaran",
        "Numero Pedido",
        "Fecha Pedido",
        "Factura",
        "Fecha Factura",
    ];
    let line = |article, description, quantity: f64, price: f64, total: f64| {
        vec![
            Text(article),
            Text(description),
            Number(quantity),
            Number(price),
            Number(0.0),
            Number(total),
            Text("ALB-1"),
            Date(2024, 1, 20),
            Number(50.0),
            Date(2024, 1, 15),
            Number(15.0),
            Date(2024, 2, 1),
        ]
    };
    let rows = [
        line("A-1", "Tornillos M6", 5.0, 2.5, 12.5),
        line("A-2", "Tuercas M6", 0.0, 1.0, 0.0),
    ];
    write_workbook(path, &headers, &rows);
}
