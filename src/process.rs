//! One run of the pipeline: extract the four categories, join them, project
//! the output columns, group into invoices and write the documents.

use std::{
    path::PathBuf,
    time::{Duration, Instant},
};

use anyhow::{Context, Result, anyhow};
use itertools::Itertools;
use log::{debug, info, warn};

use crate::{
    config::PipelineConfig,
    dataset::Dataset,
    error::EtlError,
    extract::{self, Category},
    join::{self, JoinKind, JoinOn},
    load,
    transform::{self, Invoice},
};

/// One join in the fixed merge sequence.
#[derive(Debug, Clone, Copy)]
pub struct MergeStep {
    pub name: &'static str,
    pub left: &'static [&'static str],
    pub right: &'static [&'static str],
}

impl MergeStep {
    fn on(&self) -> JoinOn {
        JoinOn::pairs(self.left, self.right)
    }
}

pub const INVOICES_WITH_CLIENTS: MergeStep = MergeStep {
    name: "invoices with clients",
    left: &["ft_id_cliente"],
    right: &["cte_id_cliente"],
};

pub const ORDER_LINES_WITH_ORDERS: MergeStep = MergeStep {
    name: "order-lines with orders",
    left: &["lpd_numero_pedido", "lpd_ano_numeracion_pedido"],
    right: &["pd_numpedido", "pd_ano_numeracion"],
};

pub const ORDERS_WITH_INVOICES: MergeStep = MergeStep {
    name: "orders with invoices",
    left: &["lpd_factura", "lpd_ano_numeracion_factura"],
    right: &["ft_numfactura", "ft_ano_numeracion"],
};

/// The four normalized source datasets.
#[derive(Debug, Clone)]
pub struct Sources {
    pub invoices: Dataset,
    pub clients: Dataset,
    pub order_lines: Dataset,
    pub orders: Dataset,
}

#[derive(Debug)]
pub struct PipelineSummary {
    pub invoices: usize,
    pub written: Vec<PathBuf>,
    pub failed: usize,
    pub elapsed: Duration,
}

pub fn extract_sources(config: &PipelineConfig) -> Result<Sources> {
    let options = config.read_options()?;
    let read = |category: Category| -> Result<Dataset> {
        let dir = config.source_dir(category);
        extract::extract(&dir, category, &options)
            .with_context(|| format!("Extracting {category} from {dir:?}"))
    };
    Ok(Sources {
        invoices: read(Category::Invoices)?,
        clients: read(Category::Clients)?,
        order_lines: read(Category::OrderLines)?,
        orders: read(Category::Orders)?,
    })
}

fn merge_step(left: &Dataset, right: &Dataset, step: &MergeStep) -> Result<Dataset, EtlError> {
    debug!("Merge step: {}", step.name);
    let merged = join::merge(left, right, &step.on(), JoinKind::Inner)?;
    if merged.is_empty() {
        return Err(EtlError::EmptyMerge {
            step: step.name.to_string(),
        });
    }
    Ok(merged)
}

/// Runs the three inner joins in dependency order. An empty intermediate
/// result stops the run.
pub fn merge_sources(sources: &Sources) -> Result<Dataset, EtlError> {
    let invoices = merge_step(&sources.invoices, &sources.clients, &INVOICES_WITH_CLIENTS)?;
    let lines = merge_step(&sources.order_lines, &sources.orders, &ORDER_LINES_WITH_ORDERS)?;
    merge_step(&lines, &invoices, &ORDERS_WITH_INVOICES)
}

/// Narrows the merged table to `columns`, warning about any that are absent.
pub fn project(merged: &Dataset, columns: &[String]) -> Dataset {
    let (projected, missing) = merged.select_available(columns);
    if !missing.is_empty() {
        warn!(
            "Columns not found in merged data: {}",
            missing.iter().join(", ")
        );
    }
    debug!("Projected {} of {} column(s)", projected.columns.len(), columns.len());
    projected
}

/// Everything up to, but not including, writing.
pub fn build_invoices(config: &PipelineConfig) -> Result<Vec<Invoice>> {
    let sources = extract_sources(config)?;
    let merged = merge_sources(&sources).context("Merging source datasets")?;
    let projected = project(&merged, &config.columns);
    let invoices = transform::transform(&projected, config.header_policy)
        .context("Transforming merged rows into invoices")?;
    Ok(invoices)
}

pub fn execute(config: &PipelineConfig) -> Result<PipelineSummary> {
    let started = Instant::now();
    info!("Starting ETL process");

    let invoices = build_invoices(config)?;
    if invoices.is_empty() {
        return Err(anyhow!("No invoices to save"));
    }

    let report = load::load(&invoices, &config.output.path, config.output.mode)
        .with_context(|| format!("Preparing output location {:?}", config.output.path))?;
    if !report.is_clean() {
        warn!(
            "{} of {} document(s) could not be written",
            report.failures.len(),
            report.failures.len() + report.written.len()
        );
    }

    let elapsed = started.elapsed();
    info!(
        "ETL process completed successfully in {:.2} seconds",
        elapsed.as_secs_f64()
    );
    info!("Processed {} invoices", invoices.len());
    Ok(PipelineSummary {
        invoices: invoices.len(),
        failed: report.failures.len(),
        written: report.written,
        elapsed,
    })
}
