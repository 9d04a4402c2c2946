use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).expect("write file");
    path
}

fn hogvm(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("hogvm").expect("binary should build");
    cmd.current_dir(dir).env_remove("HOGVM_TRACE");
    cmd
}

fn program(dir: &TempDir, bytecode: &str) -> PathBuf {
    write_file(dir.path(), "prog.hoge", bytecode)
}

#[test]
fn test_prints_stdout_lines() {
    let dir = TempDir::new().unwrap();
    program(&dir, r#"["_H", 1, 32, "hello", 2, "print", 1, 35, 33, 1, 38]"#);
    hogvm(dir.path())
        .arg("prog.hoge")
        .assert()
        .success()
        .stdout("hello\n")
        .stderr("");
}

#[test]
fn test_stdlib_is_available() {
    let dir = TempDir::new().unwrap();
    program(&dir, r#"["_H", 1, 32, "abc", 2, "upper", 1, 2, "print", 1, 35, 31, 38]"#);
    hogvm(dir.path()).arg("prog.hoge").assert().success().stdout("ABC\n");
}

#[test]
fn test_uncaught_error_keeps_partial_stdout() {
    let dir = TempDir::new().unwrap();
    program(
        &dir,
        r#"["_H", 1, 32, "before", 2, "print", 1, 35, 32, "boom", 2, "Error", 1, 49]"#,
    );
    hogvm(dir.path())
        .arg("prog.hoge")
        .assert()
        .code(1)
        .stdout("before\n")
        .stderr(predicate::str::contains("Error: Error: boom"));
}

#[test]
fn test_globals_file() {
    let dir = TempDir::new().unwrap();
    program(&dir, r#"["_H", 1, 32, "name", 32, "event", 1, 2, 2, "print", 1, 35, 31, 38]"#);
    write_file(dir.path(), "globals.json", r#"{"event": {"name": "$pageview"}}"#);
    hogvm(dir.path())
        .args(["prog.hoge", "--globals", "globals.json"])
        .assert()
        .success()
        .stdout("$pageview\n");
}

#[test]
fn test_globals_must_be_object() {
    let dir = TempDir::new().unwrap();
    program(&dir, r#"["_H", 1, 31, 38]"#);
    write_file(dir.path(), "globals.json", "[1]");
    hogvm(dir.path())
        .args(["prog.hoge", "--globals", "globals.json"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Globals must be a JSON object"));
}

#[test]
fn test_step_budget() {
    let dir = TempDir::new().unwrap();
    program(&dir, r#"["_H", 1, 39, -2]"#);
    hogvm(dir.path())
        .args(["prog.hoge", "--max-steps", "100"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Error: StepBudgetExceeded"));
}

#[test]
fn test_timeout() {
    let dir = TempDir::new().unwrap();
    program(&dir, r#"["_H", 1, 39, -2]"#);
    hogvm(dir.path())
        .args(["prog.hoge", "--timeout-ms", "20", "--max-steps", "1000000000000"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Error: Timeout: Execution timed out after 0.020 seconds"));
}

#[test]
fn test_rejects_other_extensions() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "prog.json", r#"["_H", 1, 31, 38]"#);
    hogvm(dir.path())
        .arg("prog.json")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("expected a .hoge file"));
}

#[test]
fn test_invalid_bytecode() {
    let dir = TempDir::new().unwrap();
    program(&dir, r#"["_X", 1, 31]"#);
    hogvm(dir.path())
        .arg("prog.hoge")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Error: InvalidBytecode"));
}

#[test]
fn test_json_output() {
    let dir = TempDir::new().unwrap();
    program(&dir, r#"["_H", 1, 32, "hi", 2, "print", 1, 35, 33, 2, 33, 1, 6, 38]"#);
    let output = hogvm(dir.path()).args(["prog.hoge", "--json"]).output().unwrap();
    assert!(output.status.success());
    let record: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(record["stdout"], serde_json::json!(["hi"]));
    assert_eq!(record["result"], serde_json::json!(3));
    assert!(record["error"].is_null());
    assert_eq!(record["telemetry"]["ops"], serde_json::json!(7));
}

#[test]
fn test_disassemble() {
    let dir = TempDir::new().unwrap();
    program(&dir, r#"["_H", 1, 32, "hello", 2, "print", 1, 35, 31, 38]"#);
    hogvm(dir.path())
        .args(["prog.hoge", "--disassemble"])
        .assert()
        .success()
        .stdout(predicate::str::contains("STRING 'hello'"))
        .stdout(predicate::str::contains("CALL_GLOBAL 'print' 1"))
        .stdout(predicate::str::contains("RETURN"));
}

#[test]
fn test_debug_trace_goes_to_stderr() {
    let dir = TempDir::new().unwrap();
    program(&dir, r#"["_H", 1, 33, 1, 38]"#);
    hogvm(dir.path())
        .args(["prog.hoge", "--debug"])
        .assert()
        .success()
        .stdout("")
        .stderr(predicate::str::contains("INTEGER"));
}
