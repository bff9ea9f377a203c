//! Stage runners.
//!
//! Each stage consumes a cohort, runs its external tool once per unit (or once per run)
//! and reports a typed outcome for every unit it touched.

pub mod clusters;
pub mod convert;
pub mod extract;
pub mod preprocess;
pub mod qc;
pub mod segment;
pub mod templates;

use mstseg_common::UnitId;
use mstseg_tools::DispatchReport;
use std::fmt;
use std::path::PathBuf;

/// Pipeline stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Extraction,
    Conversion,
    CohortFilter,
    QualityControl,
    TemplateAcquisition,
    Preprocessing,
    Segmentation,
    ClusterStatistics,
}

impl Stage {
    pub const ALL: [Stage; 8] = [
        Stage::Extraction,
        Stage::Conversion,
        Stage::CohortFilter,
        Stage::QualityControl,
        Stage::TemplateAcquisition,
        Stage::Preprocessing,
        Stage::Segmentation,
        Stage::ClusterStatistics,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Extraction => "Extraction",
            Stage::Conversion => "Conversion",
            Stage::CohortFilter => "Cohort Filter",
            Stage::QualityControl => "Quality Control",
            Stage::TemplateAcquisition => "Template Acquisition",
            Stage::Preprocessing => "Preprocessing",
            Stage::Segmentation => "Segmentation",
            Stage::ClusterStatistics => "Lesion Cluster Statistics",
        }
    }

    /// Failures of optional stages are downgraded to warnings.
    pub fn is_optional(&self) -> bool {
        matches!(self, Stage::QualityControl | Stage::ClusterStatistics)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What happened to one unit in one stage.
#[derive(Debug, Clone, PartialEq)]
pub enum UnitOutcome {
    Succeeded,
    /// Upstream inputs were missing, the tool never ran.
    Skipped { missing: Vec<PathBuf> },
    /// The tool ran and failed, or its outputs did not appear.
    Failed { error: String },
}

impl UnitOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, UnitOutcome::Succeeded)
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, UnitOutcome::Skipped { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, UnitOutcome::Failed { .. })
    }
}

impl fmt::Display for UnitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitOutcome::Succeeded => f.write_str("succeeded"),
            UnitOutcome::Skipped { missing } => {
                write!(f, "skipped, missing:")?;
                for path in missing {
                    write!(f, " {}", path.display())?;
                }
                Ok(())
            }
            UnitOutcome::Failed { error } => write!(f, "failed: {}", error),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnitReport {
    pub unit: UnitId,
    pub outcome: UnitOutcome,
}

impl UnitReport {
    pub fn new(unit: UnitId, outcome: UnitOutcome) -> Self {
        Self { unit, outcome }
    }
}

/// Per-unit outcomes of one stage, in cohort order.
#[derive(Debug, Clone, PartialEq)]
pub struct StageReport {
    pub stage: Stage,
    pub units: Vec<UnitReport>,
}

impl StageReport {
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            units: Vec::new(),
        }
    }

    /// Build a report from a dispatch over `units`, in the same order.
    ///
    /// Job values are per-unit outcomes; a job error (tool failure, panic) becomes
    /// [`UnitOutcome::Failed`].
    pub fn from_dispatch(
        stage: Stage,
        units: Vec<UnitId>,
        report: DispatchReport<UnitOutcome>,
    ) -> Self {
        let units = units
            .into_iter()
            .zip(report.into_outcomes())
            .map(|(unit, job)| {
                let outcome = match job.result {
                    Ok(outcome) => outcome,
                    Err(error) => UnitOutcome::Failed { error },
                };
                UnitReport::new(unit, outcome)
            })
            .collect();
        Self { stage, units }
    }

    pub fn outcome(&self, unit: &UnitId) -> Option<&UnitOutcome> {
        self.units
            .iter()
            .find(|r| &r.unit == unit)
            .map(|r| &r.outcome)
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &UnitId> {
        self.units
            .iter()
            .filter(|r| r.outcome.is_success())
            .map(|r| &r.unit)
    }

    pub fn success_count(&self) -> usize {
        self.units.iter().filter(|r| r.outcome.is_success()).count()
    }

    pub fn skipped_count(&self) -> usize {
        self.units.iter().filter(|r| r.outcome.is_skipped()).count()
    }

    pub fn failure_count(&self) -> usize {
        self.units.iter().filter(|r| r.outcome.is_failed()).count()
    }

    /// Log skipped and failed units plus a one-line summary.
    pub fn log_summary(&self) {
        for report in &self.units {
            match report.outcome {
                UnitOutcome::Succeeded => {}
                UnitOutcome::Skipped { .. } => {
                    tracing::warn!("  > {}: {}", report.unit, report.outcome)
                }
                UnitOutcome::Failed { .. } => {
                    tracing::error!("  > {}: {}", report.unit, report.outcome)
                }
            }
        }
        tracing::info!(
            "{}: {} succeeded, {} skipped, {} failed",
            self.stage,
            self.success_count(),
            self.skipped_count(),
            self.failure_count()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mstseg_common::{SessionId, SubjectId};
    use mstseg_tools::Dispatcher;

    fn unit(s: &str) -> UnitId {
        UnitId::new(SubjectId::new(s), SessionId::new("1"))
    }

    #[test]
    fn test_optional_stages() {
        let optional: Vec<_> = Stage::ALL.iter().filter(|s| s.is_optional()).collect();
        assert_eq!(
            optional,
            vec![&Stage::QualityControl, &Stage::ClusterStatistics]
        );
    }

    #[test]
    fn test_from_dispatch_maps_errors_to_failed() {
        let units = vec![unit("A"), unit("B"), unit("C")];
        let report = Dispatcher::new(2).run_all(units.clone(), |u| {
            match u.subject.as_str() {
                "A" => Ok(UnitOutcome::Succeeded),
                "B" => Ok(UnitOutcome::Skipped {
                    missing: vec![PathBuf::from("x.nii.gz")],
                }),
                _ => Err("tool exploded"),
            }
        });

        let stage = StageReport::from_dispatch(Stage::Preprocessing, units, report);
        assert_eq!(stage.success_count(), 1);
        assert_eq!(stage.skipped_count(), 1);
        assert_eq!(stage.failure_count(), 1);
        assert_eq!(
            stage.outcome(&unit("C")),
            Some(&UnitOutcome::Failed {
                error: "tool exploded".to_string()
            })
        );
        let ok: Vec<_> = stage.succeeded().cloned().collect();
        assert_eq!(ok, vec![unit("A")]);
    }

    #[test]
    fn test_outcome_display() {
        let skipped = UnitOutcome::Skipped {
            missing: vec![PathBuf::from("/d/a.nii.gz")],
        };
        assert_eq!(skipped.to_string(), "skipped, missing: /d/a.nii.gz");
        assert_eq!(
            UnitOutcome::Failed {
                error: "boom".into()
            }
            .to_string(),
            "failed: boom"
        );
    }
}
