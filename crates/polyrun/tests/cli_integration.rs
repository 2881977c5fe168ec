//! Drives the built binary end to end. Only the JavaScript backend is used
//! since it needs no downloads.

use std::path::Path;
use std::process::{Command, Output};

fn polyrun(cwd: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_polyrun"))
        .current_dir(cwd)
        .env("POLYRUN_LOG", "off")
        .args(args)
        .output()
        .expect("failed to launch polyrun")
}

/// A working directory whose config keeps the cache inside the temp dir.
fn workspace() -> tempfile::TempDir {
    let temp = tempfile::tempdir().unwrap();
    let cache = temp.path().join("cache");
    std::fs::write(
        temp.path().join("polyrun.toml"),
        format!("[cache]\ndirectory = {:?}\n", cache.display().to_string()),
    )
    .unwrap();
    temp
}

#[test]
fn test_languages_lists_backends() {
    let temp = workspace();
    let output = polyrun(temp.path(), &["languages"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for language in ["javascript", "python", "c", "cpp"] {
        assert!(stdout.contains(language), "missing {language}: {stdout}");
    }
}

#[test]
fn test_languages_json() {
    let temp = workspace();
    let output = polyrun(temp.path(), &["languages", "--json"]);

    assert!(output.status.success());
    let entries: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(entries[0]["language"], "javascript");
    assert_eq!(entries[2]["kind"], "compiled");
}

#[test]
fn test_run_javascript_passes() {
    let temp = workspace();
    std::fs::write(
        temp.path().join("add.js"),
        "function add(a, b) { return a + b; }",
    )
    .unwrap();
    std::fs::write(
        temp.path().join("check.js"),
        "if (add(2, 3) !== 5) throw new Error('wrong'); console.log('ok');",
    )
    .unwrap();

    let output = polyrun(
        temp.path(),
        &["run", "--lang", "JavaScript", "add.js", "--validation", "check.js", "--json"],
    );

    assert!(output.status.success());
    let result: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(result["success"], true);
    assert_eq!(result["output"][0], "ok");
}

#[test]
fn test_run_javascript_failure_exits_nonzero() {
    let temp = workspace();
    std::fs::write(temp.path().join("bad.js"), "throw new Error('boom')").unwrap();

    let output = polyrun(temp.path(), &["run", "--lang", "javascript", "bad.js", "--json"]);

    assert_eq!(output.status.code(), Some(1));
    let result: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(result["success"], false);
    assert_eq!(result["error"], "boom");
    assert_eq!(result["failure"], "runtime");
}

#[test]
fn test_unsupported_language() {
    let temp = workspace();
    std::fs::write(temp.path().join("main.go"), "package main").unwrap();

    let output = polyrun(temp.path(), &["run", "--lang", "go", "main.go"]);

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Unsupported language 'go'"));
}

#[test]
fn test_run_reports_result_once() {
    let temp = workspace();
    std::fs::write(temp.path().join("hello.js"), "console.log('hello')").unwrap();

    let output = polyrun(temp.path(), &["run", "--lang", "javascript", "hello.js"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.matches("hello").count(), 1, "{stdout}");
    assert_eq!(stdout.matches("✓ Passed").count(), 1, "{stdout}");
}
