//! Typed identifiers for pipeline units.
//!
//! A unit is one (subject, session) pair. Both halves are derived from the raw media
//! filename and only ever contain ASCII alphanumerics, optionally carrying the BIDS
//! `sub-` / `ses-` prefix once the cohort has been formatted for conversion.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// BIDS prefix for subject labels.
pub const SUBJECT_PREFIX: &str = "sub-";

/// BIDS prefix for session labels.
pub const SESSION_PREFIX: &str = "ses-";

/// Keep only ASCII alphanumeric characters of a filename token.
pub fn sanitize_token(token: &str) -> String {
    token.chars().filter(|c| c.is_ascii_alphanumeric()).collect()
}

/// Subject identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectId(String);

impl SubjectId {
    /// Build a subject id from an arbitrary token, dropping everything but ASCII
    /// alphanumerics.
    pub fn new(token: &str) -> Self {
        Self(sanitize_token(token))
    }

    /// The id as stored (prefixed once BIDS formatted).
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The bare label without the BIDS prefix.
    pub fn label(&self) -> &str {
        self.0.strip_prefix(SUBJECT_PREFIX).unwrap_or(&self.0)
    }

    /// BIDS formatted id. Idempotent.
    #[must_use]
    pub fn to_bids(&self) -> Self {
        Self(format!("{}{}", SUBJECT_PREFIX, self.label()))
    }
}

impl std::fmt::Display for SubjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Session identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Build a session id from an arbitrary token, dropping everything but ASCII
    /// alphanumerics.
    pub fn new(token: &str) -> Self {
        Self(sanitize_token(token))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The bare label without the BIDS prefix.
    pub fn label(&self) -> &str {
        self.0.strip_prefix(SESSION_PREFIX).unwrap_or(&self.0)
    }

    /// BIDS formatted id. Idempotent.
    #[must_use]
    pub fn to_bids(&self) -> Self {
        Self(format!("{}{}", SESSION_PREFIX, self.label()))
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One (subject, session) work item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitId {
    pub subject: SubjectId,
    pub session: SessionId,
}

impl UnitId {
    pub fn new(subject: SubjectId, session: SessionId) -> Self {
        Self { subject, session }
    }

    /// Derive a unit identifier from a raw media filename.
    ///
    /// The stem is split on `_`: the last token is the subject and the first token is
    /// the session. Filenames with a single token, or whose first/last token has no
    /// alphanumeric characters, are rejected.
    ///
    /// # Examples
    ///
    /// ```
    /// use mstseg_common::UnitId;
    ///
    /// let unit = UnitId::from_filename("/data/sourcedata/20180605_RR215.iso")?;
    /// assert_eq!(unit.subject.as_str(), "RR215");
    /// assert_eq!(unit.session.as_str(), "20180605");
    /// # Ok::<(), mstseg_common::Error>(())
    /// ```
    pub fn from_filename<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .ok_or_else(|| Error::invalid_filename(path, "no file stem"))?;

        let tokens: Vec<&str> = stem.split('_').collect();
        if tokens.len() < 2 {
            return Err(Error::invalid_filename(
                path,
                format!("expected <session>_..._<subject>, got {} token(s)", tokens.len()),
            ));
        }

        let subject = SubjectId::new(tokens[tokens.len() - 1]);
        let session = SessionId::new(tokens[0]);

        if subject.as_str().is_empty() {
            return Err(Error::invalid_filename(path, "subject token is empty after sanitizing"));
        }
        if session.as_str().is_empty() {
            return Err(Error::invalid_filename(path, "session token is empty after sanitizing"));
        }

        Ok(Self { subject, session })
    }

    /// BIDS formatted copy of this unit.
    #[must_use]
    pub fn to_bids(&self) -> Self {
        Self {
            subject: self.subject.to_bids(),
            session: self.session.to_bids(),
        }
    }

    /// `<subject>_<session>`, used to key per-unit files.
    pub fn key(&self) -> String {
        format!("{}_{}", self.subject, self.session)
    }
}

impl std::fmt::Display for UnitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.subject, self.session)
    }
}
