//! Extraction: discover raw media, derive unit identifiers, unpack each medium.

use super::{Stage, StageReport, UnitOutcome};
use crate::config::Config;
use anyhow::{Context, Result};
use mstseg_common::layout::has_extension;
use mstseg_common::{Cohort, UnitId};
use mstseg_tools::{Dispatcher, TemplateContext};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// An input file that did not yield a unit.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedInput {
    pub file: PathBuf,
    pub reason: String,
}

/// Turns raw media filenames into unit identifiers and prepares their directories.
#[derive(Debug)]
pub struct IdentifierDeriver {
    root: PathBuf,
    seen: HashSet<UnitId>,
}

impl IdentifierDeriver {
    /// Deriver creating unit directories under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            seen: HashSet::new(),
        }
    }

    /// `<root>/<subject>/<session>` for `unit`.
    pub fn unit_dir(&self, unit: &UnitId) -> PathBuf {
        self.root
            .join(unit.subject.as_str())
            .join(unit.session.as_str())
    }

    /// Derive the unit for `path` and create its directory.
    ///
    /// A unit already derived by this deriver is rejected as a duplicate.
    pub fn derive(&mut self, path: &Path) -> mstseg_common::Result<UnitId> {
        let unit = UnitId::from_filename(path)?;

        if self.seen.contains(&unit) {
            return Err(mstseg_common::Error::DuplicateUnit {
                unit: unit.to_string(),
                file: path.to_path_buf(),
            });
        }

        std::fs::create_dir_all(self.unit_dir(&unit))?;
        self.seen.insert(unit.clone());
        Ok(unit)
    }
}

/// Raw media files directly under `dir` with one of `extensions`, sorted by name.
pub fn discover_inputs(dir: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        anyhow::bail!("Raw input directory does not exist: {:?}", dir);
    }

    let mut inputs = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.with_context(|| format!("Failed to list {:?}", dir))?;
        let path = entry.path();
        if entry.file_type().is_file() && has_extension(path, extensions) {
            inputs.push(path.to_path_buf());
        }
    }

    debug!("Discovered {} raw input(s) in {:?}", inputs.len(), dir);
    Ok(inputs)
}

/// Output of the extraction stage.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub cohort: Cohort,
    pub report: StageReport,
    pub rejected: Vec<RejectedInput>,
}

/// A derived unit paired with the file it came from.
#[derive(Debug, Clone)]
struct Medium {
    unit: UnitId,
    input: PathBuf,
    output: PathBuf,
}

impl std::fmt::Display for Medium {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.unit)
    }
}

/// Run the extraction stage.
///
/// Identifiers are always derived. The extraction tool is only invoked when
/// `extraction.enabled` is set; otherwise the report is empty.
pub fn run(config: &Config, dispatcher: &Dispatcher) -> Result<Extraction> {
    let raw_dir = &config.paths.raw_dir;
    let inputs = discover_inputs(raw_dir, &config.extraction.extensions)?;

    let mut deriver = IdentifierDeriver::new(raw_dir);
    let mut media = Vec::new();
    let mut rejected = Vec::new();

    for input in inputs {
        match deriver.derive(&input) {
            Ok(unit) => {
                debug!("{:?} -> {}", input, unit);
                let output = deriver.unit_dir(&unit);
                media.push(Medium {
                    unit,
                    input,
                    output,
                });
            }
            Err(e) => {
                warn!("Skipping {:?}: {}", input, e);
                rejected.push(RejectedInput {
                    file: input,
                    reason: e.to_string(),
                });
            }
        }
    }

    let cohort: Cohort = media.iter().map(|m| m.unit.clone()).collect();
    info!(
        "Derived {} unit(s), rejected {} input(s)",
        cohort.len(),
        rejected.len()
    );

    if !config.extraction.enabled {
        info!("Extraction tool disabled, using previously extracted data");
        return Ok(Extraction {
            cohort,
            report: StageReport::new(Stage::Extraction),
            rejected,
        });
    }

    let units: Vec<UnitId> = media.iter().map(|m| m.unit.clone()).collect();
    let spec = &config.tools.extract;
    let outcomes = dispatcher.run_all(media, |medium| {
        let ctx = TemplateContext::new()
            .with_unit(&medium.unit)
            .with_path("input", &medium.input)
            .with_path("output", &medium.output)
            .with_path("raw_dir", raw_dir);
        let command = spec.render(&ctx);
        info!("  >> {}: Extracting {:?}", medium.unit, medium.input);
        command.execute().map(|_| UnitOutcome::Succeeded)
    });
    outcomes.log_summary(Stage::Extraction.name());

    Ok(Extraction {
        cohort,
        report: StageReport::from_dispatch(Stage::Extraction, units, outcomes),
        rejected,
    })
}
