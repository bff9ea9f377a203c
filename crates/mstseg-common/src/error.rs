//! Common error types used throughout mstseg.
//!
//! This module covers the structural failures shared by every crate: malformed input
//! filenames, misaligned cohorts, and I/O failures while preparing unit directories.

use std::path::PathBuf;

/// Common error type for mstseg.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A raw media filename could not be turned into a unit identifier.
    #[error("Invalid filename {}: {reason}", file.display())]
    InvalidFilename { file: PathBuf, reason: String },

    /// Two raw inputs derived the same unit identifier.
    #[error("Duplicate unit {unit} derived from {}", file.display())]
    DuplicateUnit { unit: String, file: PathBuf },

    /// Subject and session sequences have different lengths.
    #[error("Cohort misaligned: {subjects} subjects but {sessions} sessions")]
    CohortMisaligned { subjects: usize, sessions: usize },

    /// An I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a new InvalidFilename error.
    pub fn invalid_filename<S: Into<String>>(file: impl Into<PathBuf>, reason: S) -> Self {
        Self::InvalidFilename {
            file: file.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias using the common Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::invalid_filename("/raw/RR215.iso", "expected at least two tokens");
        assert_eq!(
            err.to_string(),
            "Invalid filename /raw/RR215.iso: expected at least two tokens"
        );

        let err = Error::CohortMisaligned {
            subjects: 3,
            sessions: 2,
        };
        assert_eq!(
            err.to_string(),
            "Cohort misaligned: 3 subjects but 2 sessions"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = Error::from(io_err);
        assert!(matches!(err, Error::Io(_)));
    }
}
