//! Template acquisition: make sure the reference template and tissue priors exist.

use crate::config::{Config, TemplatesConfig};
use anyhow::{Context, Result};
use mstseg_common::layout::missing_files;
use mstseg_tools::{get_tool_path, TemplateContext};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Resolved template files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateSet {
    pub reference: PathBuf,
    pub gm: PathBuf,
    pub wm: PathBuf,
    pub csf: PathBuf,
}

impl TemplateSet {
    pub fn resolve(config: &TemplatesConfig) -> Self {
        Self {
            reference: config.dir.join(&config.reference),
            gm: config.dir.join(&config.gm),
            wm: config.dir.join(&config.wm),
            csf: config.dir.join(&config.csf),
        }
    }

    pub fn files(&self) -> Vec<PathBuf> {
        vec![
            self.reference.clone(),
            self.gm.clone(),
            self.wm.clone(),
            self.csf.clone(),
        ]
    }

    /// Priors in tissue class order.
    pub fn priors(&self) -> [&PathBuf; 3] {
        [&self.gm, &self.wm, &self.csf]
    }

    pub fn missing(&self) -> Vec<PathBuf> {
        missing_files(&self.files())
    }
}

/// Resolve the templates, fetching them once if any are missing.
pub fn run(config: &Config) -> Result<TemplateSet> {
    let templates = TemplateSet::resolve(&config.templates);
    let missing = templates.missing();
    if missing.is_empty() {
        info!("Templates found in {:?}", config.templates.dir);
        return Ok(templates);
    }

    for path in &missing {
        warn!("  > missing template {:?}", path);
    }

    let Some(ref fetch) = config.tools.template_fetch else {
        anyhow::bail!(
            "{} template file(s) missing from {:?} and no fetch command configured",
            missing.len(),
            config.templates.dir
        );
    };

    let program = fetch.program.as_str();
    let resolved = get_tool_path(program, Some(Path::new(program)))
        .with_context(|| format!("Template fetch tool unavailable: {}", program))?;
    debug!("Template fetch tool: {:?}", resolved);

    std::fs::create_dir_all(&config.templates.dir).with_context(|| {
        format!("Failed to create templates directory: {:?}", config.templates.dir)
    })?;

    let t = &config.templates;
    let ctx = TemplateContext::new()
        .with_path("templates_dir", &t.dir)
        .with_var("reference", &t.reference)
        .with_var("gm", &t.gm)
        .with_var("wm", &t.wm)
        .with_var("csf", &t.csf);

    info!("  >> Fetching templates into {:?}", t.dir);
    fetch
        .render(&ctx)
        .execute()
        .context("Template fetch command failed")?;

    let still_missing = templates.missing();
    if !still_missing.is_empty() {
        anyhow::bail!(
            "Template file(s) still missing after fetch: {:?}",
            still_missing
        );
    }

    Ok(templates)
}
