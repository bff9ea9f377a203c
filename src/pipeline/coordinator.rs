use crate::cohort_filter::{CohortFilter, Removal};
use crate::config::Config;
use crate::conversion::ConversionTemplate;
use crate::stages::extract::RejectedInput;
use crate::stages::{self, clusters, convert, extract, preprocess, qc, segment, Stage, StageReport};
use anyhow::{Context, Result};
use mstseg_common::Cohort;
use mstseg_tools::{Dispatcher, Scratch};
use tracing::{debug, error, info, warn};

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Units that made it through segmentation.
    pub cohort: Cohort,
    /// Per-unit outcomes of every stage that reports them, in run order.
    pub stages: Vec<StageReport>,
    pub removed: Vec<Removal>,
    pub rejected_inputs: Vec<RejectedInput>,
    pub warnings: Vec<String>,
}

impl RunSummary {
    fn new() -> Self {
        Self {
            cohort: Cohort::empty(),
            stages: Vec::new(),
            removed: Vec::new(),
            rejected_inputs: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn report(&self, stage: Stage) -> Option<&StageReport> {
        self.stages.iter().find(|r| r.stage == stage)
    }
}

/// Runs every stage in order over one cohort.
///
/// The scratch area holding per-unit conversion configs lives as long as the pipeline
/// and is removed when it is dropped, whether the run succeeded or not.
pub struct Pipeline<'a> {
    config: &'a Config,
    dispatcher: Dispatcher,
    template: ConversionTemplate,
    scratch: Scratch,
}

impl<'a> Pipeline<'a> {
    /// Load the conversion template and set up the scratch area.
    pub fn new(config: &'a Config) -> Result<Self> {
        let template = ConversionTemplate::load(
            &config.paths.conversion_template,
            &config.conversion.criteria_field,
        )
        .context("Failed to load conversion template")?;
        debug!(
            "Conversion template {:?}: {} description(s), criteria field {}",
            template.source(),
            template.description_count(),
            template.criteria_field()
        );

        let scratch = match config.paths.scratch_dir {
            Some(ref parent) => Scratch::new_in(parent),
            None => Scratch::new(),
        }
        .context("Failed to create scratch area")?;

        Ok(Self {
            config,
            dispatcher: config.dispatch.dispatcher(),
            template,
            scratch,
        })
    }

    fn run_stage<T>(&self, stage: Stage, f: impl FnOnce() -> Result<T>) -> Result<T> {
        info!("{}: Running", stage);
        let value = f().with_context(|| format!("{} failed", stage))?;
        info!("{}: Finished", stage);
        Ok(value)
    }

    /// Like [`run_stage`](Self::run_stage), but a failure of a stage marked optional
    /// becomes a warning and `None`. Required stages still abort the run.
    fn run_optional_stage<T>(
        &self,
        stage: Stage,
        warnings: &mut Vec<String>,
        f: impl FnOnce() -> Result<T>,
    ) -> Result<Option<T>> {
        if !stage.is_optional() {
            return self.run_stage(stage, f).map(Some);
        }

        info!("{}: Running", stage);
        match f() {
            Ok(value) => {
                info!("{}: Finished", stage);
                Ok(Some(value))
            }
            Err(e) => {
                error!("{}: {:#}", stage, e);
                warn!("{} failed, continuing without it", stage);
                warnings.push(format!("{} failed: {:#}", stage, e));
                Ok(None)
            }
        }
    }

    /// Run the whole pipeline.
    pub fn run(self) -> Result<RunSummary> {
        let config = self.config;
        let dispatcher = &self.dispatcher;
        let mut summary = RunSummary::new();

        info!(">> STARTING PROCESSING <<");
        info!(
            "Dispatching across {} worker(s){}",
            dispatcher.workers(),
            if dispatcher.is_serial() { " (serial)" } else { "" }
        );

        let extraction = self.run_stage(Stage::Extraction, || extract::run(config, dispatcher))?;
        for rejected in &extraction.rejected {
            summary.warnings.push(format!(
                "Rejected input {:?}: {}",
                rejected.file, rejected.reason
            ));
        }
        summary.rejected_inputs = extraction.rejected;
        summary.stages.push(extraction.report);

        if extraction.cohort.is_empty() {
            warn!("No units derived from {:?}", config.paths.raw_dir);
        }
        let cohort = extraction.cohort.to_bids();

        let (cohort, report) = self.run_stage(Stage::Conversion, || {
            convert::run(cohort, config, dispatcher, &self.template, &self.scratch)
        })?;
        summary.stages.push(report);

        let cohort = if config.filter.enabled {
            let outcome = self.run_stage(Stage::CohortFilter, || {
                CohortFilter::from_config(config)?.filter(cohort)
            })?;
            summary.removed = outcome.removed;
            outcome.cohort
        } else {
            info!("{}: Disabled", Stage::CohortFilter);
            cohort
        };

        if config.qc.enabled {
            self.run_optional_stage(Stage::QualityControl, &mut summary.warnings, || {
                qc::run(&cohort, config, dispatcher)
            })?;
        } else {
            info!("{}: Disabled", Stage::QualityControl);
        }

        let templates = self.run_stage(Stage::TemplateAcquisition, || {
            stages::templates::run(config)
        })?;

        cohort
            .ensure_aligned()
            .context("Cohort misaligned before preprocessing")?;

        let (cohort, report) = self.run_stage(Stage::Preprocessing, || {
            preprocess::run(cohort, config, dispatcher, &templates)
        })?;
        summary.stages.push(report);

        let (cohort, report) = self.run_stage(Stage::Segmentation, || {
            segment::run(cohort, config, dispatcher, &templates)
        })?;
        summary.stages.push(report);

        if config.stats.enabled {
            if let Some(report) =
                self.run_optional_stage(Stage::ClusterStatistics, &mut summary.warnings, || {
                    clusters::run(&cohort, config, dispatcher)
                })?
            {
                summary.stages.push(report);
            }
        }

        summary.cohort = cohort;

        if let Err(e) = self.scratch.cleanup() {
            warn!("{}", e);
        }

        info!(
            ">> FINISHED << {} unit(s) segmented, {} removed, {} warning(s)",
            summary.cohort.len(),
            summary.removed.len(),
            summary.warnings.len()
        );

        Ok(summary)
    }
}
