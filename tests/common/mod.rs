//! Shared fixture for integration tests.
//!
//! Builds a throwaway project tree (raw inputs, master conversion template, templates
//! directory) and a [`Config`] whose tools are small `sh -c` scripts standing in for
//! the imaging tools. The fake extractor copies each raw file into
//! `<raw>/<subject>/<session>/desc.txt`; the fake converter turns that text into the
//! `ProcedureStepDescription` of the unit's T1w sidecar.

#![allow(dead_code)]

use mstseg::config::Config;
use mstseg_tools::ToolSpec;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Description that makes the fake converter skip the FLAIR volume.
pub const NO_FLAIR: &str = "Screening noflair";

const CONVERT_SCRIPT: &str = r#"set -e
grep -qF '*{session_label}*' {config}
d={bids_dir}/{subject}/{session}/anat
mkdir -p "$d" {bids_dir}/tmp_dcm2bids
desc=$(cat {unit_raw_dir}/desc.txt)
printf '{"ProcedureStepDescription": "%s"}' "$desc" > "$d/{subject}_{session}_T1w.json"
touch "$d/{subject}_{session}_T1w.nii.gz"
case "$desc" in *noflair*) ;; *) touch "$d/{subject}_{session}_FLAIR.nii.gz" ;; esac
"#;

const TEMPLATE: &str = r#"{
  "descriptions": [
    {"dataType": "anat", "modalityLabel": "T1w", "criteria": {"SeriesDescription": "*T1*"}},
    {"dataType": "anat", "modalityLabel": "FLAIR", "criteria": {"SeriesDescription": "*FLAIR*"}}
  ]
}"#;

pub struct Fixture {
    pub dir: TempDir,
    pub config: Config,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        let mut config = Config::default();
        config.paths.raw_dir = root.join("sourcedata");
        config.paths.bids_dir = root.join("bids_input");
        config.paths.derivatives_dir = root.join("derivatives");
        config.paths.conversion_template = root.join("code").join("dcm2bids_config.json");
        config.paths.scratch_dir = Some(root.join("scratch"));
        config.paths.log_to_file = false;
        config.dispatch.threads = Some(2);
        config.qc.work_dir = root.join("work");
        config.templates.dir = root.join("templates");
        config.templates.reference = "ref.nii.gz".into();
        config.templates.gm = "gm.nii.gz".into();
        config.templates.wm = "wm.nii.gz".into();
        config.templates.csf = "csf.nii.gz".into();

        config.tools.extract = sh("cp {input} {output}/desc.txt");
        config.tools.convert = sh(CONVERT_SCRIPT);
        config.tools.qc = sh("mkdir -p {output} && echo {mode} >> {output}/qc_modes.txt");
        config.tools.preprocess =
            sh("touch {preprocessed} {mask} {brain} {forward_transform} {inverse_transform}");
        config.tools.tissue_segmentation = sh("touch {labels} {gm_prob} {wm_prob} {csf_prob}");
        config.tools.lesion_segmentation = sh("touch {output}");
        config.tools.clusters = sh(r#"echo '{"count": 1, "volume": 8.5}'"#);

        std::fs::create_dir_all(&config.paths.raw_dir).unwrap();
        std::fs::create_dir_all(root.join("code")).unwrap();
        std::fs::write(&config.paths.conversion_template, TEMPLATE).unwrap();

        std::fs::create_dir_all(&config.templates.dir).unwrap();
        for name in ["ref", "gm", "wm", "csf"] {
            std::fs::write(config.templates.dir.join(format!("{name}.nii.gz")), b"").unwrap();
        }

        Self { dir, config }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Add a raw medium whose acquisition is described by `description`.
    pub fn add_input(&self, name: &str, description: &str) -> PathBuf {
        let path = self.config.paths.raw_dir.join(name);
        std::fs::write(&path, description).unwrap();
        path
    }

    pub fn bids_unit_dir(&self, subject: &str, session: &str) -> PathBuf {
        self.config.paths.bids_dir.join(subject).join(session)
    }

    pub fn derivatives_unit_dir(&self, subject: &str, session: &str) -> PathBuf {
        self.config.paths.derivatives_dir.join(subject).join(session)
    }

    /// Files directly under the scratch parent, i.e. leftover scratch areas.
    pub fn scratch_leftovers(&self) -> usize {
        match std::fs::read_dir(self.root().join("scratch")) {
            Ok(entries) => entries.count(),
            Err(_) => 0,
        }
    }
}

pub fn sh(script: &str) -> ToolSpec {
    ToolSpec::new("sh", &["-c", script])
}
