//! Process-scoped scratch area for ephemeral per-unit artifacts.

use crate::{Error, Result};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Scratch directory that lives for one pipeline run.
///
/// Per-unit artifacts (rendered conversion configs and the like) are written here
/// under names keyed by subject and session. The directory and everything in it is
/// removed when the scratch area is dropped.
///
/// # Example
///
/// ```no_run
/// use mstseg_tools::Scratch;
///
/// let scratch = Scratch::new()?;
/// let artifact = scratch.file("_tmp_sub-01_ses-01_config.json");
/// std::fs::write(&artifact, "{}")?;
/// scratch.cleanup()?;
/// assert!(!artifact.exists());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct Scratch {
    temp_dir: TempDir,
}

impl Scratch {
    /// Create a scratch area in the system temp directory.
    pub fn new() -> Result<Self> {
        let temp_dir = tempfile::Builder::new()
            .prefix("mstseg-")
            .tempdir()
            .map_err(|e| Error::Scratch(e.to_string()))?;
        Ok(Self { temp_dir })
    }

    /// Create a scratch area under `parent`, creating `parent` if needed.
    pub fn new_in<P: AsRef<Path>>(parent: P) -> Result<Self> {
        let parent = parent.as_ref();
        std::fs::create_dir_all(parent)?;
        let temp_dir = tempfile::Builder::new()
            .prefix("mstseg-")
            .tempdir_in(parent)
            .map_err(|e| Error::Scratch(e.to_string()))?;
        Ok(Self { temp_dir })
    }

    /// Get the scratch directory path.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Path of a file with the given name inside the scratch area.
    pub fn file(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(name)
    }

    /// Remove the scratch area now, reporting failures instead of ignoring them.
    pub fn cleanup(self) -> Result<()> {
        let path = self.temp_dir.path().to_path_buf();
        self.temp_dir
            .close()
            .map_err(|e| Error::Scratch(format!("failed to remove {:?}: {}", path, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_inside_scratch() {
        let scratch = Scratch::new().unwrap();
        let artifact = scratch.file("config.json");
        assert!(artifact.starts_with(scratch.path()));
        assert_eq!(artifact.file_name().unwrap(), "config.json");
    }

    #[test]
    fn test_new_in_parent() {
        let parent = tempfile::tempdir().unwrap();
        let scratch = Scratch::new_in(parent.path().join("nested")).unwrap();
        assert!(scratch.path().starts_with(parent.path()));
        assert!(scratch.path().is_dir());
    }

    #[test]
    fn test_drop_removes_contents() {
        let scratch = Scratch::new().unwrap();
        let artifact = scratch.file("a.json");
        std::fs::write(&artifact, "{}").unwrap();
        let dir = scratch.path().to_path_buf();
        drop(scratch);
        assert!(!artifact.exists());
        assert!(!dir.exists());
    }

    #[test]
    fn test_cleanup() {
        let scratch = Scratch::new().unwrap();
        let dir = scratch.path().to_path_buf();
        scratch.cleanup().unwrap();
        assert!(!dir.exists());
    }
}
