mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let mut config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    expand_paths(&mut config);
    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = [
        "./mstseg.toml",
        "./config.toml",
        "~/.config/mstseg/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    Ok(Config::default())
}

fn expand(path: &mut std::path::PathBuf) {
    let expanded = shellexpand::tilde(&path.to_string_lossy()).into_owned();
    *path = expanded.into();
}

fn expand_paths(config: &mut Config) {
    expand(&mut config.paths.raw_dir);
    expand(&mut config.paths.bids_dir);
    expand(&mut config.paths.derivatives_dir);
    expand(&mut config.paths.conversion_template);
    if let Some(ref mut scratch) = config.paths.scratch_dir {
        expand(scratch);
    }
    expand(&mut config.templates.dir);
    expand(&mut config.qc.work_dir);
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.dispatch.threads == Some(0) {
        anyhow::bail!("dispatch.threads cannot be 0");
    }

    if config.extraction.extensions.is_empty() {
        anyhow::bail!("extraction.extensions cannot be empty");
    }

    if config.conversion.criteria_field.trim().is_empty() {
        anyhow::bail!("conversion.criteria_field cannot be empty");
    }

    for dir in &config.conversion.cleanup_dirs {
        let path = Path::new(dir);
        if dir.is_empty() || path.is_absolute() || dir.contains("..") {
            anyhow::bail!(
                "conversion.cleanup_dirs entry '{}' must be a relative path inside bids_dir",
                dir
            );
        }
    }

    if config.filter.enabled {
        if config.filter.field.trim().is_empty() {
            anyhow::bail!("filter.field cannot be empty");
        }
        if config.filter.mode == MatchMode::Regex {
            regex::Regex::new(&config.filter.pattern).with_context(|| {
                format!("filter.pattern is not a valid regex: {}", config.filter.pattern)
            })?;
        }
    }

    if !(0.0..=1.0).contains(&config.stats.threshold) {
        anyhow::bail!(
            "stats.threshold must be within [0, 1], got {}",
            config.stats.threshold
        );
    }

    for (name, spec) in config.tools.named() {
        if spec.program.trim().is_empty() {
            anyhow::bail!("tools.{} has no program", name);
        }
    }

    Ok(())
}

/// Problems that do not make a configuration invalid but are worth reporting.
///
/// Kept apart from [`validate_config`] so callers can log them once logging is set up.
pub fn config_warnings(config: &Config) -> Vec<String> {
    let mut warnings = Vec::new();

    if config.extraction.enabled && !config.paths.raw_dir.exists() {
        warnings.push(format!(
            "Raw input directory does not exist: {:?}",
            config.paths.raw_dir
        ));
    }
    if !config.paths.conversion_template.exists() {
        warnings.push(format!(
            "Conversion template does not exist: {:?}",
            config.paths.conversion_template
        ));
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        validate_config(&config).unwrap();
        assert_eq!(config.filter.field, "ProcedureStepDescription");
        assert_eq!(config.filter.pattern, "screen");
        assert_eq!(config.filter.mode, MatchMode::Contains);
        assert_eq!(config.dispatch.reserved, 2);
        assert!(!config.stats.enabled);
        assert_eq!(config.tools.convert.program, "dcm2bids");
    }

    #[test]
    fn test_load_partial_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[paths]
raw_dir = "/data/raw"

[dispatch]
threads = 3

[filter]
pattern = "^screening$"
mode = "regex"

[tools.extract]
program = "7z"
args = ["x", "-o{{output}}", "{{input}}"]
"#
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.paths.raw_dir, Path::new("/data/raw"));
        assert_eq!(config.paths.bids_dir, Path::new("data/bids_input"));
        assert_eq!(config.dispatch.threads, Some(3));
        assert_eq!(config.dispatch.dispatcher().workers(), 3);
        assert_eq!(config.filter.mode, MatchMode::Regex);
        assert_eq!(config.tools.extract.program, "7z");
        assert_eq!(config.tools.extract.args[1], "-o{output}");
        assert_eq!(config.tools.convert.program, "dcm2bids");
    }

    #[test]
    fn test_serial_overrides_threads() {
        let dispatch = DispatchConfig {
            threads: Some(8),
            reserved: 2,
            serial: true,
        };
        assert!(dispatch.dispatcher().is_serial());
    }

    #[test]
    fn test_reject_zero_threads() {
        let mut config = Config::default();
        config.dispatch.threads = Some(0);
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_reject_invalid_regex() {
        let mut config = Config::default();
        config.filter.mode = MatchMode::Regex;
        config.filter.pattern = "(unclosed".to_string();
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("regex"));
    }

    #[test]
    fn test_reject_escaping_cleanup_dir() {
        let mut config = Config::default();
        config.conversion.cleanup_dirs = vec!["../outside".to_string()];
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_reject_threshold_out_of_range() {
        let mut config = Config::default();
        config.stats.threshold = 1.5;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_missing_directories_warn_without_failing() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.paths.raw_dir = dir.path().join("raw");
        config.paths.conversion_template = dir.path().join("dcm2bids_config.json");

        validate_config(&config).unwrap();
        let warnings = config_warnings(&config);
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].starts_with("Raw input directory does not exist"));

        std::fs::create_dir_all(&config.paths.raw_dir).unwrap();
        std::fs::write(&config.paths.conversion_template, "{}").unwrap();
        assert!(config_warnings(&config).is_empty());

        config.extraction.enabled = false;
        std::fs::remove_dir(&config.paths.raw_dir).unwrap();
        assert!(config_warnings(&config).is_empty());
    }

    #[test]
    fn test_programs_follow_enabled_stages() {
        let mut config = Config::default();
        config.stats.enabled = false;
        assert!(!config.programs().contains(&config.tools.clusters.program.as_str()));

        config.stats.enabled = true;
        assert_eq!(
            config.programs().last(),
            Some(&config.tools.clusters.program.as_str())
        );

        config.qc.enabled = false;
        assert!(!config.programs().contains(&config.tools.qc.program.as_str()));
        assert!(config.programs().contains(&"dcm2bids"));
    }

    #[test]
    fn test_malformed_config_fails() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[dispatch\nthreads = ").unwrap();
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse"));
    }

    #[test]
    fn test_missing_custom_path_fails() {
        let err = load_config_or_default(Some(Path::new("/nonexistent/mstseg.toml"))).unwrap_err();
        assert!(err.to_string().contains("Failed to read"));
    }
}
