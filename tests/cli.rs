//! Integration tests for top-level CLI behavior.

use std::path::Path;
use std::process::Command;

fn run_repodoc(dir: &Path, args: &[&str]) -> std::process::Output {
    let bin = env!("CARGO_BIN_EXE_repodoc");
    Command::new(bin)
        .args(args)
        .current_dir(dir)
        .env_remove("REPODOC_CONFIG")
        .env("REPODOC_STORE", dir.join("store"))
        .env("REPODOC_WORKSPACE_ROOT", dir.join("workspaces"))
        .env("RUST_LOG", "warn")
        .output()
        .expect("failed to run repodoc binary")
}

fn stdout_json(output: &std::process::Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).expect("stdout is not JSON")
}

#[test]
fn validate_rejects_unrecognized_host() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_repodoc(dir.path(), &["validate", "https://example.com/a/b"]);

    assert!(!output.status.success());
    let json = stdout_json(&output);
    assert_eq!(json["valid"], false);
    assert!(json["error"].as_str().unwrap().contains("invalid repository"));
}

#[test]
fn list_on_empty_store() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_repodoc(dir.path(), &["list"]);

    assert!(output.status.success());
    let json = stdout_json(&output);
    assert_eq!(json["count"], 0);
    assert_eq!(json["repositories"], serde_json::json!([]));
}

#[test]
fn docs_for_unknown_repository_fails() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_repodoc(dir.path(), &["docs", "Hello-World"]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success());
    assert!(stderr.contains("no documentation for Hello-World"));
}

#[test]
fn sweep_removes_orphaned_workspaces() {
    let dir = tempfile::tempdir().unwrap();
    let orphan = dir.path().join("workspaces/repodoc-demo-0001");
    std::fs::create_dir_all(&orphan).unwrap();
    std::fs::write(orphan.join("main.py"), "print('hi')\n").unwrap();

    let output = run_repodoc(dir.path(), &["sweep"]);

    assert!(output.status.success());
    assert_eq!(stdout_json(&output)["removed"], serde_json::json!(["repodoc-demo-0001"]));
    assert!(!orphan.exists());
}

#[test]
fn analyze_help_lists_run_options() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_repodoc(dir.path(), &["analyze", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("--max-size-mb"));
    assert!(stdout.contains("--keep-workspace"));
}

#[test]
fn invalid_subcommand_exits_with_error() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_repodoc(dir.path(), &["nonsense"]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success());
    assert!(stderr.contains("unrecognized subcommand"));
}
