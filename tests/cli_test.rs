//! CLI end-to-end tests
//!
//! Tests for the mstseg command-line interface.

mod common;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::process::Command;
use tempfile::tempdir;

/// Get a command for the mstseg binary
#[allow(deprecated)]
fn mstseg_cmd() -> Command {
    Command::cargo_bin("mstseg").unwrap()
}

#[test]
fn test_cli_no_args_shows_help() {
    let mut cmd = mstseg_cmd();
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_cli_version_command() {
    let mut cmd = mstseg_cmd();
    cmd.arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("mstseg"));
}

#[test]
fn test_cli_run_help() {
    let mut cmd = mstseg_cmd();
    cmd.args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--serial"))
        .stdout(predicate::str::contains("--no-extract"))
        .stdout(predicate::str::contains("--skip-qc"));
}

#[test]
fn test_cli_derive() {
    let mut cmd = mstseg_cmd();
    cmd.args(["derive", "/data/sourcedata/20180605_RR215.iso"])
        .assert()
        .success()
        .stdout(predicate::str::contains("RR215\t20180605\tsub-RR215_ses-20180605"));
}

#[test]
fn test_cli_derive_rejects_bad_name() {
    let mut cmd = mstseg_cmd();
    cmd.args(["derive", "20180605_RR215.iso", "RR215.iso"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("sub-RR215_ses-20180605"))
        .stderr(predicate::str::contains("1 of 2 file(s) rejected"));
}

#[test]
fn test_cli_render_config() {
    let dir = tempdir().unwrap();
    let template = dir.path().join("dcm2bids_config.json");
    fs::write(
        &template,
        r#"{"descriptions": [{"modalityLabel": "T1w", "criteria": {}}]}"#,
    )
    .unwrap();

    let mut cmd = mstseg_cmd();
    cmd.current_dir(dir.path())
        .args(["render-config"])
        .arg(&template)
        .args(["sub-RR215", "20180605", "--output"])
        .arg(dir.path().join("out"))
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "_tmp_sub-RR215_ses-20180605_config.json",
        ));

    let rendered = fs::read_to_string(
        dir.path()
            .join("out")
            .join("_tmp_sub-RR215_ses-20180605_config.json"),
    )
    .unwrap();
    assert!(rendered.contains("*20180605*"));
}

#[test]
fn test_cli_render_config_missing_template() {
    let dir = tempdir().unwrap();
    let mut cmd = mstseg_cmd();
    cmd.current_dir(dir.path())
        .args(["render-config", "missing.json", "RR215", "20180605"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("conversion template"));
}

#[test]
fn test_cli_validate_config() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("mstseg.toml");
    fs::write(
        &config,
        r#"
[dispatch]
threads = 3

[filter]
pattern = "screen"
mode = "contains"
"#,
    )
    .unwrap();

    let mut cmd = mstseg_cmd();
    cmd.arg("validate")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"))
        .stdout(predicate::str::contains("Workers: 3"));
}

#[test]
fn test_cli_validate_invalid_config() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("mstseg.toml");
    fs::write(&config, "[filter]\nmode = \"regex\"\npattern = \"(\"\n").unwrap();

    let mut cmd = mstseg_cmd();
    cmd.arg("validate").arg(&config).assert().failure();
}

#[test]
fn test_cli_check_tools() {
    let dir = tempdir().unwrap();
    let mut cmd = mstseg_cmd();
    cmd.current_dir(dir.path())
        .arg("check-tools")
        .assert()
        .success()
        .stdout(predicate::str::contains("dcm2bids"));
}

#[cfg(unix)]
#[test]
fn test_cli_run_with_fake_tools() {
    let fixture = common::Fixture::new();
    fixture.add_input("20180605_RR215.iso", "Screening");
    fixture.add_input("20190101_B2.iso", "Follow-up");

    let mut config = fixture.config.clone();
    config.paths.log_to_file = true;
    let config_path = fixture.root().join("mstseg.toml");
    fs::write(&config_path, toml::to_string(&config).unwrap()).unwrap();

    let mut cmd = mstseg_cmd();
    cmd.arg("--config")
        .arg(&config_path)
        .args(["run", "--serial"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Segmented units: 1"))
        .stdout(predicate::str::contains("sub-B2 ses-20190101"));

    let log = fs::read_to_string(config.paths.derivatives_dir.join("run_pipeline.log")).unwrap();
    assert!(log.contains(">> STARTING PROCESSING <<"));
    assert!(log.contains("Conversion: Finished"));
}

#[cfg(unix)]
#[test]
fn test_cli_run_fails_on_missing_raw_dir() {
    let fixture = common::Fixture::new();
    let mut config = fixture.config.clone();
    config.paths.raw_dir = fixture.root().join("nowhere");
    let config_path = fixture.root().join("mstseg.toml");
    fs::write(&config_path, toml::to_string(&config).unwrap()).unwrap();

    let mut cmd = mstseg_cmd();
    cmd.arg("--config")
        .arg(&config_path)
        .arg("run")
        .assert()
        .failure()
        .stdout(predicate::str::contains("Raw input directory does not exist"))
        .stderr(predicate::str::contains("Extraction failed"));
}
