//! Preprocessing: bring each anatomical volume into reference space.

use super::templates::TemplateSet;
use super::{Stage, StageReport, UnitOutcome};
use crate::config::Config;
use anyhow::{Context, Result};
use mstseg_common::layout::missing_files;
use mstseg_common::{BidsLayout, Cohort, DerivativeLayout, Modality, UnitId};
use mstseg_tools::{Dispatcher, TemplateContext};
use tracing::info;

/// Preprocess one modality of one unit.
fn preprocess_modality(
    unit: &UnitId,
    modality: Modality,
    config: &Config,
    templates: &TemplateSet,
) -> Result<UnitOutcome> {
    let bids = BidsLayout::new(&config.paths.bids_dir);
    let derivatives = DerivativeLayout::new(&config.paths.derivatives_dir);

    let input = bids.volume(unit, modality.bids_suffix());
    let missing = missing_files(std::slice::from_ref(&input));
    if !missing.is_empty() {
        return Ok(UnitOutcome::Skipped { missing });
    }

    let outdir = derivatives.unit_dir(unit);
    std::fs::create_dir_all(&outdir)
        .with_context(|| format!("Failed to create {:?}", outdir))?;

    let ctx = TemplateContext::new()
        .with_unit(unit)
        .with_path("input", &input)
        .with_var("modality", modality.as_str())
        .with_path("reference", &templates.reference)
        .with_path("outdir", &outdir)
        .with_path("preprocessed", &derivatives.preprocessed(unit, modality))
        .with_path("mask", &derivatives.mask(unit, modality))
        .with_path("brain", &derivatives.brain(unit, modality))
        .with_path("forward_transform", &derivatives.forward_transform(unit, modality))
        .with_path("inverse_transform", &derivatives.inverse_transform(unit, modality));

    info!("  >> {}: Preprocessing {}", unit, modality);
    config
        .tools
        .preprocess
        .render(&ctx)
        .execute()
        .with_context(|| format!("{} preprocessing failed", modality))?;

    let absent = missing_files(&derivatives.preprocessing_outputs(unit, modality));
    if !absent.is_empty() {
        anyhow::bail!(
            "{} preprocessing finished without writing {:?}",
            modality,
            absent
        );
    }

    Ok(UnitOutcome::Succeeded)
}

/// Preprocess every modality of one unit.
///
/// Modalities are independent: a missing FLAIR does not stop the T1 from being
/// processed. The unit fails if any modality fails, and is skipped if any input was
/// missing.
pub fn preprocess_unit(unit: &UnitId, config: &Config, templates: &TemplateSet) -> UnitOutcome {
    let mut missing = Vec::new();
    let mut errors = Vec::new();

    for modality in Modality::ALL {
        match preprocess_modality(unit, modality, config, templates) {
            Ok(UnitOutcome::Skipped { missing: m }) => missing.extend(m),
            Ok(UnitOutcome::Failed { error }) => errors.push(error),
            Ok(UnitOutcome::Succeeded) => {}
            Err(e) => errors.push(format!("{:#}", e)),
        }
    }

    if !errors.is_empty() {
        UnitOutcome::Failed {
            error: errors.join("; "),
        }
    } else if !missing.is_empty() {
        UnitOutcome::Skipped { missing }
    } else {
        UnitOutcome::Succeeded
    }
}

/// Run preprocessing across the cohort. The cohort is returned unchanged.
pub fn run(
    cohort: Cohort,
    config: &Config,
    dispatcher: &Dispatcher,
    templates: &TemplateSet,
) -> Result<(Cohort, StageReport)> {
    cohort.ensure_aligned()?;

    let units: Vec<UnitId> = cohort.units().collect();
    let outcomes = dispatcher.run_all(units.clone(), |unit| {
        Ok::<_, String>(preprocess_unit(unit, config, templates))
    });

    let report = StageReport::from_dispatch(Stage::Preprocessing, units, outcomes);
    report.log_summary();
    Ok((cohort, report))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use mstseg_tools::ToolSpec;
    use std::path::Path;

    fn setup(dir: &Path) -> (Config, TemplateSet) {
        let mut config = Config::default();
        config.paths.bids_dir = dir.join("bids");
        config.paths.derivatives_dir = dir.join("derivatives");
        config.tools.preprocess = ToolSpec::new(
            "sh",
            &[
                "-c",
                "touch {preprocessed} {mask} {brain} {forward_transform} {inverse_transform}",
            ],
        );
        let templates = TemplateSet::resolve(&config.templates);
        (config, templates)
    }

    fn unit(name: &str) -> UnitId {
        UnitId::from_filename(name).unwrap().to_bids()
    }

    fn write_inputs(config: &Config, unit: &UnitId, modalities: &[Modality]) {
        let bids = BidsLayout::new(&config.paths.bids_dir);
        std::fs::create_dir_all(bids.anat_dir(unit)).unwrap();
        for m in modalities {
            std::fs::write(bids.volume(unit, m.bids_suffix()), b"").unwrap();
        }
    }

    #[test]
    fn test_preprocess_writes_contract() {
        let dir = tempfile::tempdir().unwrap();
        let (config, templates) = setup(dir.path());
        let u = unit("20180605_RR215.iso");
        write_inputs(&config, &u, &Modality::ALL);

        assert_eq!(preprocess_unit(&u, &config, &templates), UnitOutcome::Succeeded);

        let derivatives = DerivativeLayout::new(&config.paths.derivatives_dir);
        assert!(missing_files(&derivatives.segmentation_inputs(&u)).is_empty());
    }

    #[test]
    fn test_missing_input_skips() {
        let dir = tempfile::tempdir().unwrap();
        let (config, templates) = setup(dir.path());
        let u = unit("20180605_RR215.iso");
        write_inputs(&config, &u, &[Modality::T1]);

        match preprocess_unit(&u, &config, &templates) {
            UnitOutcome::Skipped { missing } => {
                assert_eq!(missing.len(), 1);
                assert!(missing[0].to_string_lossy().ends_with("_FLAIR.nii.gz"));
            }
            other => panic!("expected skip, got {other:?}"),
        }

        // T1 still processed.
        let derivatives = DerivativeLayout::new(&config.paths.derivatives_dir);
        assert!(derivatives.brain(&u, Modality::T1).is_file());
    }

    #[test]
    fn test_missing_output_fails() {
        let dir = tempfile::tempdir().unwrap();
        let (mut config, templates) = setup(dir.path());
        config.tools.preprocess = ToolSpec::new("sh", &["-c", "touch {preprocessed}"]);
        let u = unit("20180605_RR215.iso");
        write_inputs(&config, &u, &Modality::ALL);

        assert!(preprocess_unit(&u, &config, &templates).is_failed());
    }

    #[test]
    fn test_run_keeps_cohort() {
        let dir = tempfile::tempdir().unwrap();
        let (config, templates) = setup(dir.path());
        let a = unit("20180605_RR215.iso");
        let b = unit("20190101_B2.iso");
        write_inputs(&config, &a, &Modality::ALL);

        let cohort: Cohort = vec![a.clone(), b.clone()].into_iter().collect();
        let (out, report) = run(cohort.clone(), &config, &Dispatcher::new(2), &templates).unwrap();
        assert_eq!(out, cohort);
        assert!(report.outcome(&a).unwrap().is_success());
        assert!(report.outcome(&b).unwrap().is_skipped());
    }
}
