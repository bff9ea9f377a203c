use mstseg_tools::{Dispatcher, ToolSpec};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Run configuration, loaded once at startup and passed by reference to every stage.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub dispatch: DispatchConfig,

    #[serde(default)]
    pub extraction: ExtractionConfig,

    #[serde(default)]
    pub conversion: ConversionConfig,

    #[serde(default)]
    pub filter: FilterConfig,

    #[serde(default)]
    pub qc: QcConfig,

    #[serde(default)]
    pub templates: TemplatesConfig,

    #[serde(default)]
    pub stats: StatsConfig,

    #[serde(default)]
    pub tools: ToolsConfig,
}

impl Config {
    /// Programs a run with this configuration invokes, in stage order.
    ///
    /// Tools of disabled stages are left out.
    pub fn programs(&self) -> Vec<&str> {
        let tools = &self.tools;
        let mut programs = Vec::new();
        if self.extraction.enabled {
            programs.push(tools.extract.program.as_str());
        }
        programs.push(tools.convert.program.as_str());
        if self.qc.enabled {
            programs.push(tools.qc.program.as_str());
        }
        if let Some(ref fetch) = tools.template_fetch {
            programs.push(fetch.program.as_str());
        }
        programs.extend([
            tools.preprocess.program.as_str(),
            tools.tissue_segmentation.program.as_str(),
            tools.lesion_segmentation.program.as_str(),
        ]);
        if self.stats.enabled {
            programs.push(tools.clusters.program.as_str());
        }
        programs
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PathsConfig {
    /// Directory holding the raw media, one file per unit.
    #[serde(default = "default_raw_dir")]
    pub raw_dir: PathBuf,

    /// Root of the BIDS tree written by conversion.
    #[serde(default = "default_bids_dir")]
    pub bids_dir: PathBuf,

    /// Root of the per-unit derivatives, audit logs and run log.
    #[serde(default = "default_derivatives_dir")]
    pub derivatives_dir: PathBuf,

    /// Master conversion template shared by every unit.
    #[serde(default = "default_conversion_template")]
    pub conversion_template: PathBuf,

    /// Parent of the run's scratch area (system temp dir when unset).
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,

    /// Write `run_pipeline.log` into the derivatives directory.
    #[serde(default = "default_true")]
    pub log_to_file: bool,
}

fn default_raw_dir() -> PathBuf {
    PathBuf::from("data/sourcedata")
}

fn default_bids_dir() -> PathBuf {
    PathBuf::from("data/bids_input")
}

fn default_derivatives_dir() -> PathBuf {
    PathBuf::from("data/derivatives")
}

fn default_conversion_template() -> PathBuf {
    PathBuf::from("data/code/dcm2bids_config.json")
}

fn default_true() -> bool {
    true
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            raw_dir: default_raw_dir(),
            bids_dir: default_bids_dir(),
            derivatives_dir: default_derivatives_dir(),
            conversion_template: default_conversion_template(),
            scratch_dir: None,
            log_to_file: true,
        }
    }
}

impl PathsConfig {
    /// Append-only log of units removed by the cohort filter.
    pub fn removal_log(&self) -> PathBuf {
        self.derivatives_dir.join("removed_units.tsv")
    }

    /// Append-only log of lesion cluster statistics.
    pub fn cluster_log(&self) -> PathBuf {
        self.derivatives_dir.join("lesion_clusters.tsv")
    }

    /// Output root of the quality-control reports.
    pub fn qc_dir(&self) -> PathBuf {
        self.derivatives_dir.join("mriqc")
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DispatchConfig {
    /// Explicit worker count. Overrides the reservation when set.
    #[serde(default)]
    pub threads: Option<usize>,

    /// Cores left free when sizing the pool from the available parallelism.
    #[serde(default = "default_reserved")]
    pub reserved: usize,

    /// Run every job in order on one thread.
    #[serde(default)]
    pub serial: bool,
}

fn default_reserved() -> usize {
    mstseg_tools::dispatch::DEFAULT_RESERVED_WORKERS
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            threads: None,
            reserved: default_reserved(),
            serial: false,
        }
    }
}

impl DispatchConfig {
    pub fn dispatcher(&self) -> Dispatcher {
        if self.serial {
            Dispatcher::serial()
        } else if let Some(threads) = self.threads {
            Dispatcher::new(threads)
        } else {
            Dispatcher::with_reserved(self.reserved)
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExtractionConfig {
    /// Invoke the extraction tool. When false, identifiers are still derived.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Raw media extensions picked up from `raw_dir`.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

fn default_extensions() -> Vec<String> {
    vec!["iso".to_string()]
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            extensions: default_extensions(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConversionConfig {
    /// Criteria field rewritten to `*<session>*` in every template description.
    #[serde(default = "default_criteria_field")]
    pub criteria_field: String,

    /// Directories under `bids_dir` removed after conversion.
    #[serde(default = "default_cleanup_dirs")]
    pub cleanup_dirs: Vec<String>,
}

fn default_criteria_field() -> String {
    "SidecarFilename".to_string()
}

fn default_cleanup_dirs() -> Vec<String> {
    vec!["tmp_dcm2bids".to_string()]
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            criteria_field: default_criteria_field(),
            cleanup_dirs: default_cleanup_dirs(),
        }
    }
}

/// How the filter compares the metadata field against the pattern.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Case-insensitive substring.
    #[default]
    Contains,
    /// Case-insensitive equality.
    Equals,
    /// Regular expression.
    Regex,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FilterConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// BIDS suffix of the sidecar holding the selection field.
    #[serde(default = "default_sidecar_suffix")]
    pub sidecar_suffix: String,

    /// Sidecar field the predicate reads.
    #[serde(default = "default_filter_field")]
    pub field: String,

    #[serde(default = "default_filter_pattern")]
    pub pattern: String,

    #[serde(default)]
    pub mode: MatchMode,
}

fn default_sidecar_suffix() -> String {
    "T1w".to_string()
}

fn default_filter_field() -> String {
    "ProcedureStepDescription".to_string()
}

fn default_filter_pattern() -> String {
    "screen".to_string()
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sidecar_suffix: default_sidecar_suffix(),
            field: default_filter_field(),
            pattern: default_filter_pattern(),
            mode: MatchMode::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QcConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Analysis levels, run in order.
    #[serde(default = "default_qc_modes")]
    pub modes: Vec<String>,

    /// Working directory handed to the QC tool.
    #[serde(default = "default_qc_work_dir")]
    pub work_dir: PathBuf,
}

fn default_qc_modes() -> Vec<String> {
    vec!["participant".to_string(), "group".to_string()]
}

fn default_qc_work_dir() -> PathBuf {
    std::env::temp_dir()
}

impl Default for QcConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            modes: default_qc_modes(),
            work_dir: default_qc_work_dir(),
        }
    }
}

/// Reference template and tissue priors used by preprocessing and segmentation.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TemplatesConfig {
    #[serde(default = "default_templates_dir")]
    pub dir: PathBuf,

    #[serde(default = "default_reference")]
    pub reference: String,

    #[serde(default = "default_gm")]
    pub gm: String,

    #[serde(default = "default_wm")]
    pub wm: String,

    #[serde(default = "default_csf")]
    pub csf: String,
}

fn default_templates_dir() -> PathBuf {
    PathBuf::from("data/templates")
}

fn default_reference() -> String {
    "tpl-MNI152NLin2009cAsym_res-01_T1w.nii.gz".to_string()
}

fn default_gm() -> String {
    "tpl-MNI152NLin2009cAsym_res-01_label-GM_probseg.nii.gz".to_string()
}

fn default_wm() -> String {
    "tpl-MNI152NLin2009cAsym_res-01_label-WM_probseg.nii.gz".to_string()
}

fn default_csf() -> String {
    "tpl-MNI152NLin2009cAsym_res-01_label-CSF_probseg.nii.gz".to_string()
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            dir: default_templates_dir(),
            reference: default_reference(),
            gm: default_gm(),
            wm: default_wm(),
            csf: default_csf(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StatsConfig {
    /// Run the lesion cluster statistics step after segmentation.
    #[serde(default)]
    pub enabled: bool,

    /// Probability threshold applied to the lesion map.
    #[serde(default = "default_threshold")]
    pub threshold: f64,

    /// Smallest cluster kept, in voxels.
    #[serde(default = "default_min_size")]
    pub min_size: u32,
}

fn default_threshold() -> f64 {
    0.5
}

fn default_min_size() -> u32 {
    10
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold: default_threshold(),
            min_size: default_min_size(),
        }
    }
}

/// External tool invocations. Arguments accept `{var}` placeholders.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolsConfig {
    #[serde(default = "default_extract_tool")]
    pub extract: ToolSpec,

    #[serde(default = "default_convert_tool")]
    pub convert: ToolSpec,

    #[serde(default = "default_qc_tool")]
    pub qc: ToolSpec,

    /// Optional command that downloads missing template files into `{templates_dir}`.
    #[serde(default)]
    pub template_fetch: Option<ToolSpec>,

    #[serde(default = "default_preprocess_tool")]
    pub preprocess: ToolSpec,

    #[serde(default = "default_tissue_tool")]
    pub tissue_segmentation: ToolSpec,

    #[serde(default = "default_lesion_tool")]
    pub lesion_segmentation: ToolSpec,

    #[serde(default = "default_cluster_tool")]
    pub clusters: ToolSpec,
}

fn default_extract_tool() -> ToolSpec {
    ToolSpec::new(
        "pycdlib-extract-files",
        &["-path-type", "iso", "-extract-to", "{output}", "{input}"],
    )
}

fn default_convert_tool() -> ToolSpec {
    ToolSpec::new(
        "dcm2bids",
        &[
            "-d",
            "{raw_dir}",
            "-p",
            "{participant}",
            "-s",
            "{session_label}",
            "-o",
            "{bids_dir}",
            "-c",
            "{config}",
        ],
    )
}

fn default_qc_tool() -> ToolSpec {
    ToolSpec::new(
        "mriqc",
        &[
            "{bids_dir}",
            "{output}",
            "{mode}",
            "-w",
            "{work_dir}",
            "--nprocs",
            "{threads}",
            "--no-sub",
        ],
    )
}

fn default_preprocess_tool() -> ToolSpec {
    ToolSpec::new(
        "mstseg-preprocess",
        &[
            "--input",
            "{input}",
            "--modality",
            "{modality}",
            "--template",
            "{reference}",
            "--preprocessed",
            "{preprocessed}",
            "--mask",
            "{mask}",
            "--brain",
            "{brain}",
            "--forward-transform",
            "{forward_transform}",
            "--inverse-transform",
            "{inverse_transform}",
        ],
    )
}

fn default_tissue_tool() -> ToolSpec {
    ToolSpec::new(
        "mstseg-tissue-seg",
        &[
            "--t1",
            "{t1}",
            "--flair",
            "{flair}",
            "--mask",
            "{mask}",
            "--priors",
            "{gm}",
            "{wm}",
            "{csf}",
            "--labels",
            "{labels}",
            "--probabilities",
            "{gm_prob}",
            "{wm_prob}",
            "{csf_prob}",
        ],
    )
}

fn default_lesion_tool() -> ToolSpec {
    ToolSpec::new(
        "mstseg-lesion-seg",
        &["--flair", "{flair}", "--t1", "{t1}", "--output", "{output}"],
    )
}

fn default_cluster_tool() -> ToolSpec {
    ToolSpec::new(
        "mstseg-lesion-clusters",
        &[
            "--input",
            "{input}",
            "--threshold",
            "{threshold}",
            "--min-size",
            "{min_size}",
        ],
    )
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            extract: default_extract_tool(),
            convert: default_convert_tool(),
            qc: default_qc_tool(),
            template_fetch: None,
            preprocess: default_preprocess_tool(),
            tissue_segmentation: default_tissue_tool(),
            lesion_segmentation: default_lesion_tool(),
            clusters: default_cluster_tool(),
        }
    }
}

impl ToolsConfig {
    /// Named tool specs, for validation and reporting.
    pub fn named(&self) -> Vec<(&'static str, &ToolSpec)> {
        let mut named = vec![
            ("extract", &self.extract),
            ("convert", &self.convert),
            ("qc", &self.qc),
            ("preprocess", &self.preprocess),
            ("tissue_segmentation", &self.tissue_segmentation),
            ("lesion_segmentation", &self.lesion_segmentation),
            ("clusters", &self.clusters),
        ];
        if let Some(ref fetch) = self.template_fetch {
            named.push(("template_fetch", fetch));
        }
        named
    }
}
