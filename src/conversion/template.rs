//! Per-unit conversion configs derived from one master template.

use mstseg_common::{SessionId, SubjectId};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// Errors raised while loading or rendering the conversion template.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("Failed to read conversion template {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Malformed conversion template {}: {reason}", path.display())]
    Malformed { path: PathBuf, reason: String },

    #[error("Failed to write conversion config {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Master conversion template.
///
/// Loaded once per run and shared read-only across the conversion fan-out. Rendering
/// clones the document, so concurrent renders for distinct units never interfere.
#[derive(Debug, Clone)]
pub struct ConversionTemplate {
    source: PathBuf,
    document: Value,
    criteria_field: String,
}

impl ConversionTemplate {
    /// Read and check the master template.
    ///
    /// The document must be a JSON object with a `descriptions` array whose entries
    /// are objects. A `criteria` object is created on entries that lack one.
    pub fn load(path: &Path, criteria_field: &str) -> Result<Self, TemplateError> {
        let content = std::fs::read_to_string(path).map_err(|source| TemplateError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, &content, criteria_field)
    }

    fn parse(path: &Path, content: &str, criteria_field: &str) -> Result<Self, TemplateError> {
        let malformed = |reason: String| TemplateError::Malformed {
            path: path.to_path_buf(),
            reason,
        };

        let document: Value =
            serde_json::from_str(content).map_err(|e| malformed(e.to_string()))?;

        let descriptions = document
            .get("descriptions")
            .and_then(Value::as_array)
            .ok_or_else(|| malformed("missing `descriptions` array".to_string()))?;

        for (i, entry) in descriptions.iter().enumerate() {
            let entry = entry
                .as_object()
                .ok_or_else(|| malformed(format!("descriptions[{i}] is not an object")))?;
            if let Some(criteria) = entry.get("criteria") {
                if !criteria.is_object() {
                    return Err(malformed(format!(
                        "descriptions[{i}].criteria is not an object"
                    )));
                }
            }
        }

        Ok(Self {
            source: path.to_path_buf(),
            document,
            criteria_field: criteria_field.to_string(),
        })
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn criteria_field(&self) -> &str {
        &self.criteria_field
    }

    /// Number of acquisition descriptions in the template.
    pub fn description_count(&self) -> usize {
        self.document
            .get("descriptions")
            .and_then(Value::as_array)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Pattern matched against sidecar names for `session`.
    pub fn session_pattern(session: &SessionId) -> String {
        format!("*{}*", session.label())
    }

    /// File name of the artifact for one unit.
    pub fn artifact_name(subject: &SubjectId, session: &SessionId) -> String {
        format!("_tmp_{}_{}_config.json", subject, session)
    }

    /// The template bound to one session, as a JSON document.
    pub fn bind(&self, session: &SessionId) -> Value {
        let pattern = Value::String(Self::session_pattern(session));
        let mut document = self.document.clone();

        if let Some(descriptions) = document
            .get_mut("descriptions")
            .and_then(Value::as_array_mut)
        {
            for entry in descriptions.iter_mut().filter_map(Value::as_object_mut) {
                let criteria = entry
                    .entry("criteria")
                    .or_insert_with(|| Value::Object(Map::new()));
                if let Some(criteria) = criteria.as_object_mut() {
                    criteria.insert(self.criteria_field.clone(), pattern.clone());
                }
            }
        }

        document
    }

    /// Write the artifact for one unit into `dir` and return its path.
    pub fn render(
        &self,
        subject: &SubjectId,
        session: &SessionId,
        dir: &Path,
    ) -> Result<PathBuf, TemplateError> {
        let path = dir.join(Self::artifact_name(subject, session));
        let document = self.bind(session);

        let content = serde_json::to_string_pretty(&document).map_err(|e| {
            TemplateError::Malformed {
                path: self.source.clone(),
                reason: e.to_string(),
            }
        })?;
        std::fs::write(&path, content).map_err(|source| TemplateError::Write {
            path: path.clone(),
            source,
        })?;

        Ok(path)
    }
}
