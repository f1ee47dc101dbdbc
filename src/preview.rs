use anyhow::{Context, Result};
use log::info;

use crate::{config::PipelineConfig, extract, table};

pub fn execute(config: &PipelineConfig, category: extract::Category, rows: usize) -> Result<()> {
    let dir = config.source_dir(category);
    let options = config.read_options()?;
    let dataset = extract::extract(&dir, category, &options)
        .with_context(|| format!("Extracting {category} from {dir:?}"))?;
    print!("{}", table::render_dataset(&dataset, rows));
    info!(
        "Displayed {} of {} {category} row(s)",
        rows.min(dataset.len()),
        dataset.len()
    );
    Ok(())
}
