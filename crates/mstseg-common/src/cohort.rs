//! Cohort of units flowing through the pipeline.
//!
//! A cohort is kept as two index-aligned sequences, `subjects[i]` pairing with
//! `sessions[i]`. Stages never mutate a cohort in place: they consume one and hand
//! back a replacement.

use crate::ids::{SessionId, SubjectId, UnitId};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Ordered, index-aligned subject and session lists.
///
/// Deserializing goes through [`Cohort::new`], so misaligned input is rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "CohortLists")]
pub struct Cohort {
    subjects: Vec<SubjectId>,
    sessions: Vec<SessionId>,
}

#[derive(Deserialize)]
struct CohortLists {
    subjects: Vec<SubjectId>,
    sessions: Vec<SessionId>,
}

impl TryFrom<CohortLists> for Cohort {
    type Error = Error;

    fn try_from(lists: CohortLists) -> Result<Self> {
        Cohort::new(lists.subjects, lists.sessions)
    }
}

impl Cohort {
    /// Build a cohort from parallel lists.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CohortMisaligned`] when the lists differ in length.
    pub fn new(subjects: Vec<SubjectId>, sessions: Vec<SessionId>) -> Result<Self> {
        let cohort = Self { subjects, sessions };
        cohort.ensure_aligned()?;
        Ok(cohort)
    }

    /// An empty cohort.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn subjects(&self) -> &[SubjectId] {
        &self.subjects
    }

    pub fn sessions(&self) -> &[SessionId] {
        &self.sessions
    }

    pub fn len(&self) -> usize {
        self.subjects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
    }

    /// Check `len(subjects) == len(sessions)`.
    pub fn ensure_aligned(&self) -> Result<()> {
        if self.subjects.len() != self.sessions.len() {
            return Err(Error::CohortMisaligned {
                subjects: self.subjects.len(),
                sessions: self.sessions.len(),
            });
        }
        Ok(())
    }

    /// Iterate over the units in cohort order.
    pub fn units(&self) -> impl Iterator<Item = UnitId> + '_ {
        self.subjects
            .iter()
            .zip(self.sessions.iter())
            .map(|(subject, session)| UnitId::new(subject.clone(), session.clone()))
    }

    /// Whether the cohort holds `unit`.
    pub fn contains(&self, unit: &UnitId) -> bool {
        self.units().any(|u| &u == unit)
    }

    /// Copy of the cohort with the BIDS prefix applied to every identifier.
    #[must_use]
    pub fn to_bids(&self) -> Self {
        Self {
            subjects: self.subjects.iter().map(SubjectId::to_bids).collect(),
            sessions: self.sessions.iter().map(SessionId::to_bids).collect(),
        }
    }

    /// Keep the units for which `keep` returns true, preserving order.
    #[must_use]
    pub fn retain<F>(&self, mut keep: F) -> Self
    where
        F: FnMut(&UnitId) -> bool,
    {
        self.units().filter(|u| keep(u)).collect()
    }
}

impl FromIterator<UnitId> for Cohort {
    fn from_iter<I: IntoIterator<Item = UnitId>>(iter: I) -> Self {
        let (subjects, sessions) = iter
            .into_iter()
            .map(|unit| (unit.subject, unit.session))
            .unzip();
        Self { subjects, sessions }
    }
}
