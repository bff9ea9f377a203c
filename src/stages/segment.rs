//! Segmentation: tissue classification and lesion inference on preprocessed volumes.

use super::templates::TemplateSet;
use super::{Stage, StageReport, UnitOutcome};
use crate::config::Config;
use anyhow::{Context, Result};
use mstseg_common::layout::{missing_files, TISSUE_CLASSES};
use mstseg_common::{Cohort, DerivativeLayout, Modality, UnitId};
use mstseg_tools::{Dispatcher, TemplateContext};
use tracing::info;

fn tissue_context(unit: &UnitId, layout: &DerivativeLayout, templates: &TemplateSet) -> TemplateContext {
    let mut ctx = TemplateContext::new()
        .with_unit(unit)
        .with_path("t1", &layout.brain(unit, Modality::T1))
        .with_path("flair", &layout.brain(unit, Modality::Flair))
        .with_path("mask", &layout.mask(unit, Modality::T1))
        .with_path("labels", &layout.tissue_labels(unit))
        .with_path("outdir", &layout.unit_dir(unit));

    for (class, prior) in TISSUE_CLASSES.iter().zip(templates.priors()) {
        ctx.set(class, &prior.display().to_string());
        ctx.set(
            &format!("{}_prob", class),
            &layout.tissue_probability(unit, class).display().to_string(),
        );
    }
    ctx
}

fn segment(unit: &UnitId, config: &Config, templates: &TemplateSet) -> Result<UnitOutcome> {
    let layout = DerivativeLayout::new(&config.paths.derivatives_dir);

    let missing = missing_files(&layout.segmentation_inputs(unit));
    if !missing.is_empty() {
        return Ok(UnitOutcome::Skipped { missing });
    }

    info!("  >> {}: Tissue segmentation", unit);
    config
        .tools
        .tissue_segmentation
        .render(&tissue_context(unit, &layout, templates))
        .execute()
        .context("tissue segmentation failed")?;

    let absent = missing_files(&layout.tissue_outputs(unit));
    if !absent.is_empty() {
        anyhow::bail!("tissue segmentation finished without writing {:?}", absent);
    }

    let ctx = TemplateContext::new()
        .with_unit(unit)
        .with_path("t1", &layout.brain(unit, Modality::T1))
        .with_path("flair", &layout.brain(unit, Modality::Flair))
        .with_path("output", &layout.lesion_probability(unit))
        .with_path("outdir", &layout.unit_dir(unit));

    info!("  >> {}: Lesion segmentation", unit);
    config
        .tools
        .lesion_segmentation
        .render(&ctx)
        .execute()
        .context("lesion segmentation failed")?;

    let lesion = layout.lesion_probability(unit);
    if !lesion.is_file() {
        anyhow::bail!("lesion segmentation finished without writing {:?}", lesion);
    }

    Ok(UnitOutcome::Succeeded)
}

/// Segment one unit, validating the preprocessing contract first.
pub fn segment_unit(unit: &UnitId, config: &Config, templates: &TemplateSet) -> UnitOutcome {
    segment(unit, config, templates).unwrap_or_else(|e| UnitOutcome::Failed {
        error: format!("{:#}", e),
    })
}

/// Run segmentation across the cohort.
///
/// Returns the units that were fully segmented; skipped and failed units are dropped
/// from the cohort and listed in the report.
pub fn run(
    cohort: Cohort,
    config: &Config,
    dispatcher: &Dispatcher,
    templates: &TemplateSet,
) -> Result<(Cohort, StageReport)> {
    cohort.ensure_aligned()?;

    let units: Vec<UnitId> = cohort.units().collect();
    let outcomes = dispatcher.run_all(units.clone(), |unit| {
        Ok::<_, String>(segment_unit(unit, config, templates))
    });

    let report = StageReport::from_dispatch(Stage::Segmentation, units, outcomes);
    report.log_summary();

    let segmented: Cohort = report.succeeded().cloned().collect();
    Ok((segmented, report))
}
