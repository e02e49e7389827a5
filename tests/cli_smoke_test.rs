//! Smoke tests for the `codescope` binary's subcommands, grounded on the same
//! `Command::new(env!("CARGO_BIN_EXE_..."))` idiom as the teacher's CLI integration tests.

use std::fs;
use std::process::Command;

use tempfile::TempDir;

fn write_fixture(root: &std::path::Path) {
    fs::write(root.join("lib.rs"), "pub fn greet(name: &str) -> String {\n    format!(\"hello {name}\")\n}\n").unwrap();
}

#[test]
fn index_command_reports_files_parsed_as_json() {
    let repo = TempDir::new().unwrap();
    write_fixture(repo.path());
    let index_dir = TempDir::new().unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_codescope"))
        .args(["--json", "index", repo.path().to_str().unwrap()])
        .env("RETRIEVAL_INDEX_PATH", index_dir.path())
        .output()
        .expect("failed to run index command");

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("\"status\""));
    assert!(stdout.contains("\"files_parsed\""));
}

#[test]
fn query_command_exits_nonzero_on_blank_query() {
    let repo = TempDir::new().unwrap();
    write_fixture(repo.path());
    let index_dir = TempDir::new().unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_codescope"))
        .args(["--json", "query", repo.path().to_str().unwrap(), ""])
        .env("RETRIEVAL_INDEX_PATH", index_dir.path())
        .output()
        .expect("failed to run query command");

    assert!(!output.status.success());
}

#[test]
fn config_command_prints_toml() {
    let output = Command::new(env!("CARGO_BIN_EXE_codescope")).arg("config").output().expect("failed to run config command");

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("version"));
    assert!(stdout.contains("[indexing]"));
}
