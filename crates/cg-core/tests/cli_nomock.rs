//! CLI tests for cg-core.
//!
//! These tests run the real binary and check payloads on stdout, errors on
//! stderr, and exit codes.

use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Get a Command for the cg-core binary with an isolated config lookup.
fn cg_core(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("cg-core").expect("cg-core binary should exist");
    cmd.env_remove("CG_CONFIG")
        .env_remove("CG_CONFIG_DIR")
        .env_remove("RUST_LOG")
        .env("XDG_CONFIG_HOME", home.path())
        .env("CG_LOG", "off");
    cmd
}

const RAW: &str = "\
id,x,y,district,lutheran_density,orthodox_density,total_density,total_income,estate_income,salary_pension_income,business_income
a,0,0,North,10,2,12,900,300,200,400
b,100,0,North,5,1,6,500,100,100,300
c,0,100,South,7,3,10,700,250,150,300
";

mod arguments {
    use super::*;

    #[test]
    fn help_succeeds() {
        let home = TempDir::new().unwrap();
        cg_core(&home)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("summarize"));
    }

    #[test]
    fn unknown_command_is_an_argument_error() {
        let home = TempDir::new().unwrap();
        cg_core(&home)
            .arg("nonexistent-command")
            .assert()
            .code(10)
            .stderr(predicate::str::contains("error"));
    }

    #[test]
    fn unknown_variant_is_an_argument_error() {
        let home = TempDir::new().unwrap();
        cg_core(&home)
            .args(["--variant", "spatial_magic", "config", "show"])
            .assert()
            .code(10);
    }
}

mod config {
    use super::*;

    #[test]
    fn presets_are_listed_as_json() {
        let home = TempDir::new().unwrap();
        cg_core(&home)
            .args(["config", "presets"])
            .assert()
            .success()
            .stdout(predicate::str::contains("\"quick\""))
            .stdout(predicate::str::contains("\"paper\""));
    }

    #[test]
    fn show_applies_overrides() {
        let home = TempDir::new().unwrap();
        let output = cg_core(&home)
            .args(["--preset", "quick", "--seed", "7", "config", "show"])
            .output()
            .unwrap();
        assert!(output.status.success());
        let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["result"]["config"]["seed"], 7);
        assert_eq!(json["result"]["config"]["chains"], 2);
    }

    #[test]
    fn validate_rejects_out_of_range_option() {
        let home = TempDir::new().unwrap();
        let path = home.path().join("bad.json");
        fs::write(&path, r#"{"target_accept": 0.2}"#).unwrap();
        cg_core(&home)
            .args(["config", "validate"])
            .arg(&path)
            .assert()
            .code(11)
            .stderr(predicate::str::contains("target_accept"));
    }

    #[test]
    fn validate_accepts_toml() {
        let home = TempDir::new().unwrap();
        let path = home.path().join("config.toml");
        fs::write(&path, "seed = 3\nvariants = [\"hierarchical_spatial_beta\"]\n").unwrap();
        cg_core(&home)
            .args(["--format", "summary", "config", "validate"])
            .arg(&path)
            .assert()
            .success()
            .stdout(predicate::str::contains("config validate: OK"));
    }
}

mod stages {
    use super::*;

    #[test]
    fn prepare_and_features_write_processed_table() {
        let home = TempDir::new().unwrap();
        let raw = home.path().join("raw.csv");
        fs::write(&raw, RAW).unwrap();
        let interim = home.path().join("interim.csv");
        let processed = home.path().join("processed.csv");

        cg_core(&home)
            .args(["prepare", "--input"])
            .arg(&raw)
            .arg("--output")
            .arg(&interim)
            .assert()
            .success()
            .stdout(predicate::str::contains("\"rows\": 3"));

        cg_core(&home)
            .args(["features", "--input"])
            .arg(&interim)
            .arg("--output")
            .arg(&processed)
            .assert()
            .success()
            .stdout(predicate::str::contains("\"groups\": 2"));

        let header = fs::read_to_string(&processed).unwrap();
        let header = header.lines().next().unwrap();
        assert!(header.contains("orthodox_proportion_ln"));
        assert!(header.contains("group"));
    }

    #[test]
    fn missing_input_fails_with_structured_error() {
        let home = TempDir::new().unwrap();
        cg_core(&home)
            .args(["prepare", "--input"])
            .arg(home.path().join("missing.csv"))
            .assert()
            .failure()
            .stderr(predicate::str::contains("\"status\": \"error\""));
    }

    #[test]
    fn summarize_without_traces_is_a_persistence_error() {
        let home = TempDir::new().unwrap();
        cg_core(&home)
            .args(["summarize", "--models"])
            .arg(home.path().join("models"))
            .arg("--reports")
            .arg(home.path().join("reports"))
            .assert()
            .code(14);
    }
}
