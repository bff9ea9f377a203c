//! Directory layout shared between stages.
//!
//! Every stage addresses a unit's files by `(subject, session)` under a stage root.
//! The file names here are the contract between Preprocessing and Segmentation, so
//! both sides build paths through these helpers rather than formatting them inline.

use crate::ids::UnitId;
use std::path::{Path, PathBuf};

/// Extension used for volumes written by the external tools.
pub const VOLUME_EXT: &str = "nii.gz";

/// Extension used for spatial transforms.
pub const TRANSFORM_EXT: &str = "mat";

/// Tissue classes produced by segmentation, in prior order.
pub const TISSUE_CLASSES: &[&str] = &["gm", "wm", "csf"];

/// Check if a path has one of the given extensions (case-insensitive).
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use mstseg_common::layout::has_extension;
///
/// assert!(has_extension(Path::new("/raw/20180605_RR215.iso"), &["iso".to_string()]));
/// assert!(has_extension(Path::new("scan.ISO"), &["iso".to_string()]));
/// assert!(!has_extension(Path::new("notes.txt"), &["iso".to_string()]));
/// ```
pub fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

/// Anatomical modality handled by preprocessing and segmentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modality {
    T1,
    Flair,
}

impl Modality {
    /// All modalities, in processing order.
    pub const ALL: [Modality; 2] = [Modality::T1, Modality::Flair];

    /// Short name used in derivative file names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::T1 => "t1",
            Modality::Flair => "flair",
        }
    }

    /// BIDS suffix of the raw anatomical volume.
    pub fn bids_suffix(&self) -> &'static str {
        match self {
            Modality::T1 => "T1w",
            Modality::Flair => "FLAIR",
        }
    }
}

impl std::fmt::Display for Modality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// BIDS tree produced by conversion.
#[derive(Debug, Clone)]
pub struct BidsLayout {
    root: PathBuf,
}

impl BidsLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/<subject>`
    pub fn subject_dir(&self, unit: &UnitId) -> PathBuf {
        self.root.join(unit.subject.as_str())
    }

    /// `<root>/<subject>/<session>`
    pub fn session_dir(&self, unit: &UnitId) -> PathBuf {
        self.subject_dir(unit).join(unit.session.as_str())
    }

    /// `<root>/<subject>/<session>/anat`
    pub fn anat_dir(&self, unit: &UnitId) -> PathBuf {
        self.session_dir(unit).join("anat")
    }

    /// `<subject>_<session>_<suffix>.nii.gz` in the anat directory.
    pub fn volume(&self, unit: &UnitId, suffix: &str) -> PathBuf {
        self.anat_dir(unit)
            .join(format!("{}_{}.{}", unit.key(), suffix, VOLUME_EXT))
    }

    /// `<subject>_<session>_<suffix>.json` sidecar in the anat directory.
    pub fn sidecar(&self, unit: &UnitId, suffix: &str) -> PathBuf {
        self.anat_dir(unit)
            .join(format!("{}_{}.json", unit.key(), suffix))
    }
}

/// Per-unit derivatives written by preprocessing and segmentation.
#[derive(Debug, Clone)]
pub struct DerivativeLayout {
    root: PathBuf,
}

impl DerivativeLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn subject_dir(&self, unit: &UnitId) -> PathBuf {
        self.root.join(unit.subject.as_str())
    }

    /// `<root>/<subject>/<session>`
    pub fn unit_dir(&self, unit: &UnitId) -> PathBuf {
        self.subject_dir(unit).join(unit.session.as_str())
    }

    fn file(&self, unit: &UnitId, name: String) -> PathBuf {
        self.unit_dir(unit).join(name)
    }

    /// `preprocessed_<m>.nii.gz`
    pub fn preprocessed(&self, unit: &UnitId, modality: Modality) -> PathBuf {
        self.file(unit, format!("preprocessed_{}.{}", modality, VOLUME_EXT))
    }

    /// `preprocessed_<m>_mask.nii.gz`
    pub fn mask(&self, unit: &UnitId, modality: Modality) -> PathBuf {
        self.file(unit, format!("preprocessed_{}_mask.{}", modality, VOLUME_EXT))
    }

    /// `preprocessed_<m>_brain.nii.gz`
    pub fn brain(&self, unit: &UnitId, modality: Modality) -> PathBuf {
        self.file(unit, format!("preprocessed_{}_brain.{}", modality, VOLUME_EXT))
    }

    /// `transform_<m>_2_ref.mat`
    pub fn forward_transform(&self, unit: &UnitId, modality: Modality) -> PathBuf {
        self.file(unit, format!("transform_{}_2_ref.{}", modality, TRANSFORM_EXT))
    }

    /// `transform_ref_2_<m>.mat`
    pub fn inverse_transform(&self, unit: &UnitId, modality: Modality) -> PathBuf {
        self.file(unit, format!("transform_ref_2_{}.{}", modality, TRANSFORM_EXT))
    }

    /// Every file preprocessing must leave behind for one modality.
    pub fn preprocessing_outputs(&self, unit: &UnitId, modality: Modality) -> Vec<PathBuf> {
        vec![
            self.preprocessed(unit, modality),
            self.mask(unit, modality),
            self.brain(unit, modality),
            self.forward_transform(unit, modality),
            self.inverse_transform(unit, modality),
        ]
    }

    /// Files segmentation reads.
    pub fn segmentation_inputs(&self, unit: &UnitId) -> Vec<PathBuf> {
        vec![
            self.brain(unit, Modality::T1),
            self.brain(unit, Modality::Flair),
            self.mask(unit, Modality::T1),
        ]
    }

    /// `tissue_segs.nii.gz`
    pub fn tissue_labels(&self, unit: &UnitId) -> PathBuf {
        self.file(unit, format!("tissue_segs.{}", VOLUME_EXT))
    }

    /// `tissue_segs_<class>_prob.nii.gz`
    pub fn tissue_probability(&self, unit: &UnitId, class: &str) -> PathBuf {
        self.file(unit, format!("tissue_segs_{}_prob.{}", class, VOLUME_EXT))
    }

    /// `tissue_segs_lesion_prob.nii.gz`
    pub fn lesion_probability(&self, unit: &UnitId) -> PathBuf {
        self.file(unit, format!("tissue_segs_lesion_prob.{}", VOLUME_EXT))
    }

    /// Label volume plus one probability volume per tissue class.
    pub fn tissue_outputs(&self, unit: &UnitId) -> Vec<PathBuf> {
        let mut outputs = vec![self.tissue_labels(unit)];
        outputs.extend(
            TISSUE_CLASSES
                .iter()
                .map(|class| self.tissue_probability(unit, class)),
        );
        outputs
    }
}

/// Paths from `paths` that do not exist.
pub fn missing_files(paths: &[PathBuf]) -> Vec<PathBuf> {
    paths.iter().filter(|p| !p.is_file()).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{SessionId, SubjectId};

    fn unit() -> UnitId {
        UnitId::new(SubjectId::new("RR215"), SessionId::new("20180605")).to_bids()
    }

    #[test]
    fn test_has_extension() {
        let exts = vec!["iso".to_string(), "img".to_string()];
        assert!(has_extension(Path::new("a_b.iso"), &exts));
        assert!(has_extension(Path::new("a_b.IMG"), &exts));
        assert!(!has_extension(Path::new("a_b"), &exts));
        assert!(!has_extension(Path::new("a_b.zip"), &exts));
    }

    #[test]
    fn test_bids_paths() {
        let bids = BidsLayout::new("/data/bids_input");
        assert_eq!(
            bids.sidecar(&unit(), "T1w"),
            PathBuf::from(
                "/data/bids_input/sub-RR215/ses-20180605/anat/sub-RR215_ses-20180605_T1w.json"
            )
        );
        assert_eq!(
            bids.volume(&unit(), Modality::Flair.bids_suffix()),
            PathBuf::from(
                "/data/bids_input/sub-RR215/ses-20180605/anat/sub-RR215_ses-20180605_FLAIR.nii.gz"
            )
        );
    }

    #[test]
    fn test_derivative_names() {
        let d = DerivativeLayout::new("/data/derivatives");
        let u = unit();
        let dir = PathBuf::from("/data/derivatives/sub-RR215/ses-20180605");
        assert_eq!(d.unit_dir(&u), dir);
        assert_eq!(
            d.brain(&u, Modality::T1),
            dir.join("preprocessed_t1_brain.nii.gz")
        );
        assert_eq!(
            d.mask(&u, Modality::Flair),
            dir.join("preprocessed_flair_mask.nii.gz")
        );
        assert_eq!(
            d.forward_transform(&u, Modality::T1),
            dir.join("transform_t1_2_ref.mat")
        );
        assert_eq!(
            d.inverse_transform(&u, Modality::T1),
            dir.join("transform_ref_2_t1.mat")
        );
        assert_eq!(
            d.lesion_probability(&u),
            dir.join("tissue_segs_lesion_prob.nii.gz")
        );
        assert_eq!(d.preprocessing_outputs(&u, Modality::T1).len(), 5);
        assert_eq!(d.tissue_outputs(&u).len(), 4);
    }

    #[test]
    fn test_missing_files() {
        let temp = tempfile::tempdir().unwrap();
        let dir = temp.path();
        let present = dir.join("present.nii.gz");
        std::fs::write(&present, b"x").unwrap();
        let absent = dir.join("absent.nii.gz");

        let missing = missing_files(&[present.clone(), absent.clone()]);
        assert_eq!(missing, vec![absent]);
    }
}
