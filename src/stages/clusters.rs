//! Lesion cluster statistics over segmented units.

use super::{Stage, StageReport, UnitOutcome};
use crate::audit::{ClusterLog, ClusterRecord};
use crate::config::Config;
use anyhow::{Context, Result};
use mstseg_common::{Cohort, DerivativeLayout, UnitId};
use mstseg_tools::{Dispatcher, TemplateContext};
use serde::Deserialize;
use tracing::info;

/// What the clustering tool prints on stdout.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ClusterSummary {
    pub count: u64,
    pub volume: f64,
}

impl ClusterSummary {
    /// Parse the tool output. The summary is the last non-empty line, so tools may
    /// print progress before it.
    pub fn parse(stdout: &str) -> Result<Self> {
        let line = stdout
            .lines()
            .map(str::trim)
            .rfind(|l| !l.is_empty())
            .context("clustering tool printed nothing")?;
        serde_json::from_str(line)
            .with_context(|| format!("unexpected clustering output: {}", line))
    }
}

fn cluster_unit(unit: &UnitId, config: &Config) -> Result<ClusterSummary> {
    let layout = DerivativeLayout::new(&config.paths.derivatives_dir);
    let input = layout.lesion_probability(unit);
    if !input.is_file() {
        anyhow::bail!("lesion probability map missing: {:?}", input);
    }

    let ctx = TemplateContext::new()
        .with_unit(unit)
        .with_path("input", &input)
        .with_path("outdir", &layout.unit_dir(unit))
        .with_var("threshold", &config.stats.threshold.to_string())
        .with_var("min_size", &config.stats.min_size.to_string());

    info!("  >> {}: Lesion clusters", unit);
    let output = config.tools.clusters.render(&ctx).execute()?;
    ClusterSummary::parse(&output.stdout)
}

/// Compute cluster statistics for every unit and append them to the cluster log.
///
/// Rows are written after the fan-out drains, in cohort order.
pub fn run(cohort: &Cohort, config: &Config, dispatcher: &Dispatcher) -> Result<StageReport> {
    let units: Vec<UnitId> = cohort.units().collect();
    let outcomes = dispatcher.run_all(units.clone(), |unit| {
        cluster_unit(unit, config).map_err(|e| format!("{:#}", e))
    });

    let stats = &config.stats;
    let records: Vec<ClusterRecord> = units
        .iter()
        .zip(outcomes.outcomes())
        .filter_map(|(unit, job)| {
            job.result.as_ref().ok().map(|summary| ClusterRecord {
                id: unit.key(),
                threshold: stats.threshold,
                min_size: stats.min_size,
                count: summary.count,
                volume: summary.volume,
            })
        })
        .collect();

    let log = ClusterLog::new(config.paths.cluster_log());
    log.append(&records)
        .context("Failed to record lesion cluster statistics")?;

    let report = StageReport::from_dispatch(
        Stage::ClusterStatistics,
        units,
        outcomes.map(|_| UnitOutcome::Succeeded),
    );
    report.log_summary();

    if report.failure_count() > 0 {
        anyhow::bail!(
            "lesion cluster statistics failed for {} unit(s)",
            report.failure_count()
        );
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_summary() {
        let summary = ClusterSummary::parse("loading...\n{\"count\": 3, \"volume\": 12.5}\n\n").unwrap();
        assert_eq!(
            summary,
            ClusterSummary {
                count: 3,
                volume: 12.5
            }
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(ClusterSummary::parse("").is_err());
        assert!(ClusterSummary::parse("3 clusters").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_run_appends_rows() {
        use mstseg_tools::ToolSpec;

        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.paths.derivatives_dir = dir.path().to_path_buf();
        config.stats.enabled = true;
        config.tools.clusters = ToolSpec::new(
            "sh",
            &["-c", "echo '{\"count\": 2, \"volume\": 40}'"],
        );

        let unit = UnitId::from_filename("20180605_RR215.iso").unwrap().to_bids();
        let layout = DerivativeLayout::new(dir.path());
        std::fs::create_dir_all(layout.unit_dir(&unit)).unwrap();
        std::fs::write(layout.lesion_probability(&unit), b"").unwrap();

        let cohort: Cohort = std::iter::once(unit).collect();
        let report = run(&cohort, &config, &Dispatcher::serial()).unwrap();
        assert_eq!(report.success_count(), 1);

        let rows = ClusterLog::new(config.paths.cluster_log()).read().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "sub-RR215_ses-20180605");
        assert_eq!(rows[0].count, 2);
        assert_eq!(rows[0].min_size, 10);
    }

    #[test]
    fn test_missing_map_fails_stage() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.paths.derivatives_dir = dir.path().to_path_buf();
        let cohort: Cohort =
            std::iter::once(UnitId::from_filename("20180605_RR215.iso").unwrap()).collect();

        assert!(run(&cohort, &config, &Dispatcher::serial()).is_err());
    }
}
