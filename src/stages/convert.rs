//! Conversion: bind the template to each unit and run the converter into the BIDS tree.

use super::{Stage, StageReport, UnitOutcome};
use crate::config::Config;
use crate::conversion::ConversionTemplate;
use anyhow::Result;
use mstseg_common::{Cohort, UnitId};
use mstseg_tools::{Dispatcher, Scratch, TemplateContext};
use tracing::{debug, info, warn};

/// Run the conversion stage over a BIDS formatted cohort.
///
/// Per-unit config artifacts are written to `scratch`. The cohort is returned as is;
/// the cohort filter decides which units survive.
pub fn run(
    cohort: Cohort,
    config: &Config,
    dispatcher: &Dispatcher,
    template: &ConversionTemplate,
    scratch: &Scratch,
) -> Result<(Cohort, StageReport)> {
    cohort.ensure_aligned()?;

    let units: Vec<UnitId> = cohort.units().collect();
    let spec = &config.tools.convert;
    let paths = &config.paths;

    let outcomes = dispatcher.run_all(units.clone(), |unit| {
        let artifact = template.render(&unit.subject, &unit.session, scratch.path())?;
        debug!("{}: conversion config {:?}", unit, artifact);

        let unit_raw_dir = paths
            .raw_dir
            .join(unit.subject.label())
            .join(unit.session.label());
        let ctx = TemplateContext::new()
            .with_unit(unit)
            .with_path("config", &artifact)
            .with_path("raw_dir", &paths.raw_dir)
            .with_path("unit_raw_dir", &unit_raw_dir)
            .with_path("bids_dir", &paths.bids_dir);

        info!("  >> {}: Converting", unit);
        spec.render(&ctx).execute()?;
        Ok::<_, anyhow::Error>(UnitOutcome::Succeeded)
    });
    outcomes.log_summary(Stage::Conversion.name());

    remove_leftovers(config);

    Ok((cohort, StageReport::from_dispatch(Stage::Conversion, units, outcomes)))
}

/// Remove the converter's scratch directories from the BIDS tree.
fn remove_leftovers(config: &Config) {
    for name in &config.conversion.cleanup_dirs {
        let dir = config.paths.bids_dir.join(name);
        if !dir.exists() {
            continue;
        }
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => debug!("Removed {:?}", dir),
            Err(e) => warn!("Failed to remove {:?}: {}", dir, e),
        }
    }
}
