//! Append-only tab-separated audit logs.
//!
//! Rows are written by the coordinator thread after a fan-out drains, so a log file
//! never has concurrent writers. The header is written only when the file is new or
//! empty.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

/// A unit removed by the cohort filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemovalRecord {
    pub subject: String,
    pub session: String,
    pub reason: String,
    pub removed_at: DateTime<Utc>,
}

/// Lesion cluster statistics for one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterRecord {
    pub id: String,
    pub threshold: f64,
    pub min_size: u32,
    pub count: u64,
    pub volume: f64,
}

/// Tab-separated log of `R` rows.
#[derive(Debug, Clone)]
pub struct AuditLog<R> {
    path: PathBuf,
    _record: PhantomData<R>,
}

impl<R> AuditLog<R> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _record: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<R: Serialize> AuditLog<R> {
    /// Append `records`, creating the file and its parent directory if needed.
    pub fn append(&self, records: &[R]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create log directory: {:?}", parent))?;
        }

        let needs_header = std::fs::metadata(&self.path)
            .map(|m| m.len() == 0)
            .unwrap_or(true);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open audit log: {:?}", self.path))?;

        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .has_headers(needs_header)
            .from_writer(file);

        for record in records {
            writer
                .serialize(record)
                .with_context(|| format!("Failed to write audit log: {:?}", self.path))?;
        }
        writer
            .flush()
            .with_context(|| format!("Failed to flush audit log: {:?}", self.path))?;

        Ok(())
    }
}

impl<R: serde::de::DeserializeOwned> AuditLog<R> {
    /// Read every row back. A missing file reads as empty.
    pub fn read(&self) -> Result<Vec<R>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .from_path(&self.path)
            .with_context(|| format!("Failed to open audit log: {:?}", self.path))?;

        reader
            .deserialize()
            .collect::<std::result::Result<Vec<R>, _>>()
            .with_context(|| format!("Failed to parse audit log: {:?}", self.path))
    }
}

pub type RemovalLog = AuditLog<RemovalRecord>;
pub type ClusterLog = AuditLog<ClusterRecord>;
