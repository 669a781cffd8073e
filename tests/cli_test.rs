//! Tests for the `contentgate` binary: exit codes and error output.

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn contentgate(ledger: &Path) -> Command {
    let mut cmd = Command::cargo_bin("contentgate").unwrap();
    cmd.arg("--ledger")
        .arg(ledger)
        .env_remove("CONTENTGATE_LEDGER")
        .env_remove("CONTENTGATE_OPERATOR")
        .env_remove("CONTENTGATE_LOG")
        .env("NO_COLOR", "1");
    cmd
}

fn add_stipend(ledger: &Path) {
    contentgate(ledger)
        .args([
            "add",
            "--file",
            "programs/fellowship.html",
            "--type",
            "missing-disclaimer",
            "--severity",
            "high",
            "--warnings",
            "funding-amounts,eligibility",
            "--description",
            "Stipend amount stated without a disclaimer",
            "--action",
            "Add the funding disclaimer",
            "--blocks-deployment",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created SC-001"));
}

fn site_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("testdata/site")
}

#[test]
fn test_add_validate_resolve_validate() {
    let temp = TempDir::new().unwrap();
    let ledger = temp.path().join("issues.jsonl");
    add_stipend(&ledger);

    contentgate(&ledger)
        .args(["validate", "--strict"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("SC-001"));

    contentgate(&ledger)
        .args(["validate"])
        .assert()
        .code(0);

    contentgate(&ledger)
        .args(["resolve", "SC-001", "--commit", "abc123", "--by", "editor"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Resolved SC-001 in abc123 by editor"));

    contentgate(&ledger)
        .args(["validate", "--strict"])
        .assert()
        .code(0);
}

#[test]
fn test_low_severity_non_blocking_passes() {
    let temp = TempDir::new().unwrap();
    let ledger = temp.path().join("issues.jsonl");
    contentgate(&ledger)
        .args([
            "add",
            "--file",
            "about.html",
            "--type",
            "superlative-claim",
            "--severity",
            "low",
            "--description",
            "Unsourced superlative",
        ])
        .assert()
        .success();

    contentgate(&ledger)
        .args(["validate", "--strict"])
        .assert()
        .code(0);
}

#[test]
fn test_resolve_unknown_id_fails_without_writing() {
    let temp = TempDir::new().unwrap();
    let ledger = temp.path().join("issues.jsonl");
    add_stipend(&ledger);
    let before = std::fs::read(&ledger).unwrap();

    contentgate(&ledger)
        .args(["resolve", "SC-999", "--commit", "abc123", "--by", "editor"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("error[not-found]"))
        .stderr(predicate::str::contains("hint:"));

    assert_eq!(std::fs::read(&ledger).unwrap(), before);
}

#[test]
fn test_resolve_without_commit_is_validation_error() {
    let temp = TempDir::new().unwrap();
    let ledger = temp.path().join("issues.jsonl");
    add_stipend(&ledger);

    contentgate(&ledger)
        .args(["resolve", "SC-001", "--by", "editor"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("error[validation-error]"));

    contentgate(&ledger)
        .args(["show", "SC-001", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"status\": \"pending\""));
}

#[test]
fn test_resolve_without_by_falls_back_to_login_name() {
    let temp = TempDir::new().unwrap();
    let ledger = temp.path().join("issues.jsonl");
    add_stipend(&ledger);

    contentgate(&ledger)
        .args(["resolve", "SC-001", "--commit", "abc123"])
        .env_remove("USER")
        .env_remove("USERNAME")
        .env("LOGNAME", "ci-runner")
        .assert()
        .success()
        .stdout(predicate::str::contains("Resolved SC-001 in abc123 by ci-runner"));

    contentgate(&ledger)
        .args(["validate", "--strict"])
        .assert()
        .code(0);
}

#[test]
fn test_resolve_without_by_prefers_operator() {
    let temp = TempDir::new().unwrap();
    let ledger = temp.path().join("issues.jsonl");
    add_stipend(&ledger);

    contentgate(&ledger)
        .args(["resolve", "SC-001", "--commit", "abc123"])
        .env("CONTENTGATE_OPERATOR", "release-bot")
        .env("USER", "someone-else")
        .assert()
        .success()
        .stdout(predicate::str::contains("by release-bot"));
}

#[test]
fn test_resolve_without_any_resolver_is_validation_error() {
    let temp = TempDir::new().unwrap();
    let ledger = temp.path().join("issues.jsonl");
    add_stipend(&ledger);
    let before = std::fs::read(&ledger).unwrap();

    // No login variables and a git with no readable config.
    contentgate(&ledger)
        .args(["resolve", "SC-001", "--commit", "abc123"])
        .current_dir(temp.path())
        .env_remove("USER")
        .env_remove("LOGNAME")
        .env_remove("USERNAME")
        .env("HOME", temp.path())
        .env("XDG_CONFIG_HOME", temp.path())
        .env("GIT_CONFIG_GLOBAL", "/dev/null")
        .env("GIT_CONFIG_NOSYSTEM", "1")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("error[validation-error]"));

    assert_eq!(std::fs::read(&ledger).unwrap(), before);
    contentgate(&ledger)
        .args(["validate", "--strict"])
        .assert()
        .code(1);
}

#[test]
fn test_add_with_blank_description_fails() {
    let temp = TempDir::new().unwrap();
    let ledger = temp.path().join("issues.jsonl");
    contentgate(&ledger)
        .args([
            "add",
            "--file",
            "a.html",
            "--type",
            "missing-disclaimer",
            "--severity",
            "high",
            "--description",
            "   ",
        ])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("error[validation-error]"));
    assert!(!ledger.exists());
}

#[test]
fn test_resolved_issue_rejects_transition_but_takes_notes() {
    let temp = TempDir::new().unwrap();
    let ledger = temp.path().join("issues.jsonl");
    add_stipend(&ledger);

    contentgate(&ledger)
        .args(["resolve", "SC-001", "--commit", "abc123", "--by", "editor"])
        .assert()
        .success();

    contentgate(&ledger)
        .args(["start", "SC-001"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("error[invalid-transition]"));

    contentgate(&ledger)
        .args(["note", "SC-001", "verified on staging"])
        .assert()
        .success();
}

#[test]
fn test_list_filters_and_json() {
    let temp = TempDir::new().unwrap();
    let ledger = temp.path().join("issues.jsonl");
    add_stipend(&ledger);

    let output = contentgate(&ledger)
        .args(["list", "--blocking-only", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let issues: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(issues.as_array().unwrap().len(), 1);
    assert_eq!(issues[0]["id"], "SC-001");
    assert_eq!(issues[0]["contentWarnings"][1], "eligibility");

    contentgate(&ledger)
        .args(["list", "--severity", "low", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[]"));
}

#[test]
fn test_report_markdown() {
    let temp = TempDir::new().unwrap();
    let ledger = temp.path().join("issues.jsonl");
    add_stipend(&ledger);

    contentgate(&ledger)
        .args(["report", "--format", "markdown"])
        .assert()
        .success()
        .stdout(predicate::str::contains("SC-001"))
        .stdout(predicate::str::contains("programs/fellowship.html"));
}

#[test]
fn test_validate_fails_closed_on_corrupt_ledger() {
    let temp = TempDir::new().unwrap();
    let ledger = temp.path().join("issues.jsonl");
    std::fs::write(&ledger, "{not json\n").unwrap();

    contentgate(&ledger)
        .args(["validate"])
        .assert()
        .code(2);
}

#[test]
fn test_scan_dry_run_then_record() {
    let temp = TempDir::new().unwrap();
    let ledger = temp.path().join("issues.jsonl");

    contentgate(&ledger)
        .args(["scan"])
        .arg(site_path())
        .arg("--dry-run")
        .assert()
        .success()
        .stdout(predicate::str::contains("fellowship.html"));
    assert!(!ledger.exists());

    contentgate(&ledger)
        .args(["scan"])
        .arg(site_path())
        .assert()
        .success()
        .stdout(predicate::str::contains("6 issues recorded"));

    contentgate(&ledger)
        .args(["scan"])
        .arg(site_path())
        .assert()
        .success()
        .stdout(predicate::str::contains("0 issues recorded, 6 already tracked"));
}

#[test]
fn test_rules_init_and_check() {
    let temp = TempDir::new().unwrap();
    let output = temp.path().join("rules.yaml");

    Command::cargo_bin("contentgate")
        .unwrap()
        .args(["rules", "init", "--template", "minimal", "--output"])
        .arg(&output)
        .assert()
        .success();

    Command::cargo_bin("contentgate")
        .unwrap()
        .args(["rules", "check"])
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("stipend-amount"));

    Command::cargo_bin("contentgate")
        .unwrap()
        .args(["rules", "init", "--template", "minimal", "--output"])
        .arg(&output)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn test_rules_check_rejects_invalid() {
    let invalid = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("testdata/invalid-rules.yaml");
    Command::cargo_bin("contentgate")
        .unwrap()
        .args(["rules", "check"])
        .arg(invalid)
        .assert()
        .code(1);
}
