//! Drives `diagctl` as a subprocess, covering the §7 input-error contract:
//! a bad argument or unreadable source is reported on stderr with exit code
//! 1 and nothing on stdout -- it never gets to emit a diagnosis document.

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn missing_source_file_is_an_input_error() {
    let mut cmd = Command::cargo_bin("diagctl").unwrap();
    cmd.args(["ub-detect", "/nonexistent/repro.c"])
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn version_bisect_without_a_binary_placeholder_is_an_input_error() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    let mut cmd = Command::cargo_bin("diagctl").unwrap();
    cmd.args(["version-bisect", tmp.path().to_str().unwrap(), "./run.sh --no-binary-here"])
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::is_empty());
}

#[test]
fn help_lists_every_subcommand() {
    let mut cmd = Command::cargo_bin("diagctl").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("ub-detect"))
        .stdout(predicate::str::contains("version-bisect"))
        .stdout(predicate::str::contains("pass-bisect"))
        .stdout(predicate::str::contains("analyze-report"))
        .stdout(predicate::str::contains("full-pipeline"));
}

#[test]
fn analyze_report_rejects_malformed_json_as_an_input_error() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    std::fs::write(tmp.path(), "{ not json").unwrap();
    let mut cmd = Command::cargo_bin("diagctl").unwrap();
    cmd.args(["analyze-report", tmp.path().to_str().unwrap()])
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::is_empty());
}
