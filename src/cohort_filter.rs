//! Cohort selection over conversion sidecar metadata.
//!
//! Units whose sidecar fails the predicate are removed from the cohort, their BIDS and
//! derivative trees are deleted, and a row is appended to the removal log.

use crate::audit::{RemovalLog, RemovalRecord};
use crate::config::{Config, FilterConfig, MatchMode};
use anyhow::{Context, Result};
use chrono::Utc;
use mstseg_common::{BidsLayout, Cohort, DerivativeLayout, UnitId};
use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Why a unit left the cohort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemovalReason {
    /// The field was present but did not match.
    NotSelected { field: String, value: String },
    MissingField { field: String },
    MissingMetadata { path: PathBuf },
    UnreadableMetadata { path: PathBuf, error: String },
}

impl fmt::Display for RemovalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemovalReason::NotSelected { field, value } => {
                write!(f, "not selected: {} = {:?}", field, value)
            }
            RemovalReason::MissingField { field } => write!(f, "missing field {}", field),
            RemovalReason::MissingMetadata { path } => {
                write!(f, "missing metadata {}", path.display())
            }
            RemovalReason::UnreadableMetadata { path, error } => {
                write!(f, "unreadable metadata {}: {}", path.display(), error)
            }
        }
    }
}

/// Selection rule applied to a unit's sidecar document.
pub trait UnitPredicate: Send + Sync {
    /// `Ok(())` keeps the unit.
    fn evaluate(&self, metadata: &Value) -> std::result::Result<(), RemovalReason>;

    /// Short human readable form for logs.
    fn describe(&self) -> String;
}

#[derive(Debug, Clone)]
enum Matcher {
    Contains(String),
    Equals(String),
    Regex(Regex),
}

/// Match one sidecar field against a pattern.
///
/// `contains` and `equals` compare case-insensitively.
///
/// # Example
///
/// ```
/// use mstseg::cohort_filter::{FieldMatch, UnitPredicate};
/// use serde_json::json;
///
/// let predicate = FieldMatch::contains("ProcedureStepDescription", "screen");
/// assert!(predicate.evaluate(&json!({"ProcedureStepDescription": "MS SCREENING"})).is_ok());
/// assert!(predicate.evaluate(&json!({"ProcedureStepDescription": "Week 48"})).is_err());
/// ```
#[derive(Debug, Clone)]
pub struct FieldMatch {
    field: String,
    matcher: Matcher,
}

impl FieldMatch {
    pub fn contains(field: impl Into<String>, pattern: &str) -> Self {
        Self {
            field: field.into(),
            matcher: Matcher::Contains(pattern.to_lowercase()),
        }
    }

    pub fn equals(field: impl Into<String>, pattern: &str) -> Self {
        Self {
            field: field.into(),
            matcher: Matcher::Equals(pattern.to_lowercase()),
        }
    }

    pub fn regex(field: impl Into<String>, pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern).with_context(|| format!("Invalid filter regex: {}", pattern))?;
        Ok(Self {
            field: field.into(),
            matcher: Matcher::Regex(regex),
        })
    }

    pub fn from_config(config: &FilterConfig) -> Result<Self> {
        match config.mode {
            MatchMode::Contains => Ok(Self::contains(&config.field, &config.pattern)),
            MatchMode::Equals => Ok(Self::equals(&config.field, &config.pattern)),
            MatchMode::Regex => Self::regex(&config.field, &config.pattern),
        }
    }

    fn matches(&self, value: &str) -> bool {
        match &self.matcher {
            Matcher::Contains(pattern) => value.to_lowercase().contains(pattern.as_str()),
            Matcher::Equals(pattern) => value.to_lowercase() == *pattern,
            Matcher::Regex(regex) => regex.is_match(value),
        }
    }
}

impl UnitPredicate for FieldMatch {
    fn evaluate(&self, metadata: &Value) -> std::result::Result<(), RemovalReason> {
        let value = match metadata.get(&self.field) {
            None | Some(Value::Null) => {
                return Err(RemovalReason::MissingField {
                    field: self.field.clone(),
                })
            }
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        };

        if self.matches(&value) {
            Ok(())
        } else {
            Err(RemovalReason::NotSelected {
                field: self.field.clone(),
                value,
            })
        }
    }

    fn describe(&self) -> String {
        match &self.matcher {
            Matcher::Contains(p) => format!("{} contains {:?}", self.field, p),
            Matcher::Equals(p) => format!("{} equals {:?}", self.field, p),
            Matcher::Regex(r) => format!("{} matches /{}/", self.field, r.as_str()),
        }
    }
}

/// A unit removed by the filter.
#[derive(Debug, Clone, PartialEq)]
pub struct Removal {
    pub unit: UnitId,
    pub reason: RemovalReason,
}

/// Filter result: the surviving cohort plus what was removed.
#[derive(Debug, Clone)]
pub struct FilterOutcome {
    pub cohort: Cohort,
    pub removed: Vec<Removal>,
}

/// Applies a [`UnitPredicate`] to every unit of a converted cohort.
pub struct CohortFilter {
    predicate: Box<dyn UnitPredicate>,
    bids: BidsLayout,
    derivatives: DerivativeLayout,
    sidecar_suffix: String,
    log: RemovalLog,
}

impl CohortFilter {
    pub fn new(
        predicate: Box<dyn UnitPredicate>,
        bids: BidsLayout,
        derivatives: DerivativeLayout,
    ) -> Self {
        let log = RemovalLog::new(derivatives.root().join("removed_units.tsv"));
        Self {
            predicate,
            bids,
            derivatives,
            sidecar_suffix: "T1w".to_string(),
            log,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let predicate = FieldMatch::from_config(&config.filter)?;
        Ok(Self::new(
            Box::new(predicate),
            BidsLayout::new(&config.paths.bids_dir),
            DerivativeLayout::new(&config.paths.derivatives_dir),
        )
        .with_sidecar_suffix(&config.filter.sidecar_suffix)
        .with_log(RemovalLog::new(config.paths.removal_log())))
    }

    pub fn with_sidecar_suffix(mut self, suffix: &str) -> Self {
        self.sidecar_suffix = suffix.to_string();
        self
    }

    pub fn with_log(mut self, log: RemovalLog) -> Self {
        self.log = log;
        self
    }

    /// Evaluate the predicate on one unit's sidecar.
    pub fn check(&self, unit: &UnitId) -> std::result::Result<(), RemovalReason> {
        let path = self.bids.sidecar(unit, &self.sidecar_suffix);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RemovalReason::MissingMetadata { path })
            }
            Err(e) => {
                return Err(RemovalReason::UnreadableMetadata {
                    path,
                    error: e.to_string(),
                })
            }
        };

        let metadata: Value =
            serde_json::from_str(&content).map_err(|e| RemovalReason::UnreadableMetadata {
                path: path.clone(),
                error: e.to_string(),
            })?;

        self.predicate.evaluate(&metadata)
    }

    /// Filter the cohort, deleting outputs of removed units and logging them.
    ///
    /// Deletion failures are logged and do not stop the filter.
    pub fn filter(&self, cohort: Cohort) -> Result<FilterOutcome> {
        cohort.ensure_aligned()?;
        debug!("Cohort filter: {}", self.predicate.describe());

        let mut kept = Vec::new();
        let mut removed = Vec::new();
        for unit in cohort.units() {
            match self.check(&unit) {
                Ok(()) => kept.push(unit),
                Err(reason) => removed.push(Removal { unit, reason }),
            }
        }

        if removed.is_empty() {
            return Ok(FilterOutcome {
                cohort: kept.into_iter().collect(),
                removed,
            });
        }

        warn!(
            "{} unit(s) excluded by cohort filter ({})",
            removed.len(),
            self.predicate.describe()
        );

        // Record first: a unit's data must never disappear without a log row.
        let removed_at = Utc::now();
        let records: Vec<RemovalRecord> = removed
            .iter()
            .map(|r| RemovalRecord {
                subject: r.unit.subject.to_string(),
                session: r.unit.session.to_string(),
                reason: r.reason.to_string(),
                removed_at,
            })
            .collect();
        self.log
            .append(&records)
            .context("Failed to record removed units, nothing was deleted")?;

        warn!("Deleting from BIDS and derivatives directories:");
        let kept_subjects: HashSet<&str> = kept.iter().map(|u| u.subject.as_str()).collect();
        for removal in &removed {
            warn!("  > {}: {}", removal.unit, removal.reason);
            self.delete_outputs(&removal.unit, kept_subjects.contains(removal.unit.subject.as_str()));
        }

        Ok(FilterOutcome {
            cohort: kept.into_iter().collect(),
            removed,
        })
    }

    /// Delete the unit's trees. Only the session subtree goes when the subject is
    /// still in the cohort with another session.
    fn delete_outputs(&self, unit: &UnitId, subject_kept: bool) {
        let targets = if subject_kept {
            [self.bids.session_dir(unit), self.derivatives.unit_dir(unit)]
        } else {
            [self.bids.subject_dir(unit), self.derivatives.subject_dir(unit)]
        };

        for dir in targets {
            remove_tree(&dir);
        }
    }
}

fn remove_tree(dir: &Path) {
    if !dir.exists() {
        return;
    }
    match std::fs::remove_dir_all(dir) {
        Ok(()) => debug!("Removed {:?}", dir),
        Err(e) => warn!("Failed to remove {:?}: {}", dir, e),
    }
}
