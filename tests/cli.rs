//! CLI test cases.
//!
//! End-to-end tests that actually recognize pages need poppler-utils and
//! tesseract installed, so they are ignored by default, matching how we run
//! them on developer machines.

use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;

static TEST_PDF_PATH: &str = "tests/fixtures/two_pages.pdf";

/// Create a new `Command` with our binary.
fn cmd() -> Command {
    Command::cargo_bin("permit-split").unwrap()
}

#[test]
fn test_help() {
    cmd().arg("--help").assert().success();
}

#[test]
fn test_version() {
    cmd().arg("--version").assert().success();
}

#[test]
fn test_schema_lists_output_formats() {
    cmd()
        .arg("schema")
        .assert()
        .success()
        .stdout(predicate::str::contains("page_result"))
        .stdout(predicate::str::contains("split_outcome"));
}

#[test]
fn test_process_rejects_missing_input() {
    cmd()
        .arg("process")
        .arg("does/not/exist.pdf")
        .assert()
        .failure();
}

#[test]
#[ignore = "Requires poppler-utils and tesseract to be installed"]
fn test_process_emits_one_record_per_page() {
    let output = cmd()
        .arg("process")
        .arg(TEST_PDF_PATH)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let stdout = String::from_utf8(output).unwrap();
    assert_eq!(stdout.lines().count(), 2);
    for line in stdout.lines() {
        let record: serde_json::Value = serde_json::from_str(line).unwrap();
        assert!(record.get("page").is_some());
    }
}

#[test]
#[ignore = "Requires poppler-utils and tesseract to be installed"]
fn test_split_writes_per_page_files() {
    let dest = tempfile::TempDir::with_prefix("cli-split").unwrap();
    cmd()
        .arg("split")
        .arg(TEST_PDF_PATH)
        .arg("--dest")
        .arg(dest.path())
        .assert()
        .success();
    let file_count = std::fs::read_dir(dest.path()).unwrap().count();
    assert_eq!(file_count, 2);
}
