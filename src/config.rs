//! Run configuration: source locations, output contract and logging.
//!
//! Every field has a default, so a run works without any file. A YAML file
//! passed with `--config` replaces defaults field by field, and command-line
//! flags override both.

use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::{
    cli::{RunArgs, parse_delimiter},
    extract::Category,
    io_utils::{self, ReadOptions},
    load::OutputMode,
    logging::LogConfig,
    transform::HeaderPolicy,
};

/// Columns kept after the final merge, in output order.
pub const DEFAULT_COLUMNS: &[&str] = &[
    "lpd_id_articulo",
    "lpd_descripcion_linea",
    "lpd_cantidad",
    "lpd_precio_euros",
    "lpd_descuento_linea",
    "lpd_total",
    "lpd_albaran",
    "lpd_fecha_albaran",
    "pd_id_pedido",
    "pd_numpedido",
    "pd_ano_numeracion",
    "pd_fecha_pedido",
    "pd_pedido_cliente",
    "ft_id_factura",
    "ft_numfactura",
    "ft_ano_numeracion",
    "ft_fecha_factura",
    "ft_total",
    "ft_ivatotal",
    "ft_totaliva",
    "ft_observaciones",
    "cte_id_cliente",
    "cte_cliente",
    "cte_direccion",
    "cte_codigo_postal",
    "cte_ciudad",
    "cte_provincia",
    "cte_pais",
    "cte_nif",
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourceDirs {
    pub facturas: Option<PathBuf>,
    pub clientes: Option<PathBuf>,
    pub lineas_pedidos: Option<PathBuf>,
    pub pedidos: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InputConfig {
    /// Delimiter for CSV sources (`,`, `;`, `tab`, `|` ...).
    pub delimiter: Option<String>,
    /// Text encoding label for CSV sources, UTF-8 when absent.
    pub encoding: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub path: PathBuf,
    pub mode: OutputMode,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("output").join("placeholder.json"),
            mode: OutputMode::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub data_dir: PathBuf,
    pub sources: SourceDirs,
    pub input: InputConfig,
    pub output: OutputConfig,
    pub header_policy: HeaderPolicy,
    pub columns: Vec<String>,
    pub logging: LogConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            sources: SourceDirs::default(),
            input: InputConfig::default(),
            output: OutputConfig::default(),
            header_policy: HeaderPolicy::default(),
            columns: DEFAULT_COLUMNS.iter().map(|c| c.to_string()).collect(),
            logging: LogConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening config file {path:?}"))?;
        let config = serde_yaml::from_reader(BufReader::new(file))
            .with_context(|| format!("Parsing config file {path:?}"))?;
        Ok(config)
    }

    /// Loads `path` when given, otherwise starts from the defaults.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn apply_run_args(&mut self, args: &RunArgs) {
        if let Some(dir) = &args.data_dir {
            self.data_dir = dir.clone();
        }
        if let Some(path) = &args.output {
            self.output.path = path.clone();
        }
        if let Some(mode) = args.output_mode {
            self.output.mode = mode;
        }
        if let Some(policy) = args.header_policy {
            self.header_policy = policy;
        }
        if let Some(delimiter) = &args.delimiter {
            self.input.delimiter = Some(delimiter.clone());
        }
        if let Some(encoding) = &args.input_encoding {
            self.input.encoding = Some(encoding.clone());
        }
    }

    pub fn source_dir(&self, category: Category) -> PathBuf {
        let override_dir = match category {
            Category::Invoices => &self.sources.facturas,
            Category::Clients => &self.sources.clientes,
            Category::OrderLines => &self.sources.lineas_pedidos,
            Category::Orders => &self.sources.pedidos,
        };
        override_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join(category.dir_name()))
    }

    pub fn read_options(&self) -> Result<ReadOptions> {
        let delimiter = self
            .input
            .delimiter
            .as_deref()
            .map(|raw| {
                parse_delimiter(raw).map_err(|err| anyhow!("Invalid delimiter '{raw}': {err}"))
            })
            .transpose()?;
        let encoding = io_utils::resolve_encoding(self.input.encoding.as_deref())?;
        Ok(ReadOptions {
            delimiter,
            encoding,
        })
    }
}
