//! E2E error reporting: codes, suggestions and exit status.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn fc_cmd(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("fc"));
    cmd.current_dir(dir);
    cmd.env("FLOWCAST_LOG", "error");
    cmd.env("XDG_CONFIG_HOME", dir.join(".user-config"));
    cmd.env_remove("FORMAT");
    cmd
}

fn initialized() -> TempDir {
    let dir = TempDir::new().expect("create temp dir");
    fc_cmd(dir.path()).arg("init").assert().success();
    fs::write(
        dir.path().join("corpus.json"),
        r#"{"entities": [{"kind": "project", "id": "solo", "start_date": "2024-01-01", "initial_scope": 5}]}"#,
    )
    .expect("write corpus");
    fc_cmd(dir.path())
        .args(["import", "--file", "corpus.json"])
        .assert()
        .success();
    dir
}

#[test]
fn commands_outside_a_project_report_not_initialized() {
    let dir = TempDir::new().expect("create temp dir");

    fc_cmd(dir.path())
        .args(["consolidate", "project", "solo", "--json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E1001"))
        .stderr(predicate::str::contains("fc init"));
}

#[test]
fn unknown_entity_is_e2001() {
    let dir = initialized();

    fc_cmd(dir.path())
        .args(["consolidate", "project", "ghost", "--date", "2024-02-01", "--json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E2001"));
}

#[test]
fn invalid_kind_is_e2002() {
    let dir = initialized();

    fc_cmd(dir.path())
        .args(["consolidate", "portfolio", "solo"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E2002"));
}

#[test]
fn reversed_backfill_range_is_e2003() {
    let dir = initialized();

    fc_cmd(dir.path())
        .args(["backfill", "project", "solo", "--from", "2024-02-01", "--to", "2024-01-01"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E2003"));
}

#[test]
fn show_without_snapshots_suggests_consolidate() {
    let dir = initialized();

    fc_cmd(dir.path())
        .args(["show", "project", "solo"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E2001"))
        .stderr(predicate::str::contains("fc consolidate project solo"));
}

#[test]
fn malformed_corpus_is_e5002() {
    let dir = initialized();
    fs::write(dir.path().join("broken.json"), "{\"entities\": [").expect("write");

    fc_cmd(dir.path())
        .args(["import", "--file", "broken.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E5002"));
}

#[test]
fn malformed_config_is_e1002() {
    let dir = initialized();
    fs::write(dir.path().join(".flowcast/config.toml"), "[forecast\n").expect("write");

    fc_cmd(dir.path())
        .args(["batch", "--date", "2024-02-01"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E1002"));
}

#[test]
fn entity_without_history_still_consolidates() {
    let dir = initialized();

    let output = fc_cmd(dir.path())
        .args(["consolidate", "project", "solo", "--date", "2024-02-01", "--json"])
        .output()
        .expect("command should not crash");
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).expect("valid JSON");
    assert_eq!(report["snapshot"]["forecast"]["forecast_known"], false);
    assert_eq!(report["snapshot"]["forecast"]["operational_risk"], 1.0);
    assert_eq!(report["snapshot"]["scope"]["remaining_scope"], 5);
}
