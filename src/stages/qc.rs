//! Quality control over the whole BIDS tree.

use crate::config::Config;
use anyhow::{Context, Result};
use mstseg_common::Cohort;
use mstseg_tools::{Dispatcher, TemplateContext};
use tracing::info;

/// Run the QC tool once per configured mode, in order.
///
/// Any failure aborts the remaining modes; the coordinator treats the whole stage as
/// optional.
pub fn run(cohort: &Cohort, config: &Config, dispatcher: &Dispatcher) -> Result<()> {
    if cohort.is_empty() {
        info!("No units to check, skipping quality control");
        return Ok(());
    }

    let output = config.paths.qc_dir();
    std::fs::create_dir_all(&output)
        .with_context(|| format!("Failed to create QC directory: {:?}", output))?;
    std::fs::create_dir_all(&config.qc.work_dir)
        .with_context(|| format!("Failed to create QC work directory: {:?}", config.qc.work_dir))?;

    for mode in &config.qc.modes {
        let ctx = TemplateContext::new()
            .with_path("bids_dir", &config.paths.bids_dir)
            .with_path("output", &output)
            .with_path("work_dir", &config.qc.work_dir)
            .with_var("mode", mode)
            .with_var("threads", &dispatcher.workers().to_string());

        info!("  >> Quality control ({} level)", mode);
        config
            .tools
            .qc
            .render(&ctx)
            .execute()
            .with_context(|| format!("Quality control failed at {} level", mode))?;
    }

    Ok(())
}
