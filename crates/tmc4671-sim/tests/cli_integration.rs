//! Integration tests for the tmc4671-sim CLI.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use env_logger as _;
use log as _;
use tmc4671_core as _;
use tmc4671_sim as _;

fn binary_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_tmc4671-sim"))
}

fn create_temp_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn run_passing_scenario() {
    let temp_dir = tempfile::tempdir().unwrap();
    let scenario = create_temp_file(
        temp_dir.path(),
        "walk.scn",
        "read 0x00 == 0x34363731\nwrite 0x01 3 ; firmware date\nread 0x00 == 0x00101029\n",
    );

    let output = Command::new(binary_path())
        .args(["run", scenario.to_str().unwrap()])
        .output()
        .expect("failed to run tmc4671-sim");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("PASS (line 1)"));
    assert!(stdout.contains("3 passed, 0 failed"));
}

#[test]
fn run_failing_scenario_exits_nonzero() {
    let temp_dir = tempfile::tempdir().unwrap();
    let scenario = create_temp_file(temp_dir.path(), "bad.scn", "write 0x01 7\n");

    let output = Command::new(binary_path())
        .args(["run", scenario.to_str().unwrap()])
        .output()
        .expect("failed to run tmc4671-sim");

    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("FAIL (line 1)"));
    assert!(stdout.contains("hook fault"));
}

#[test]
fn run_reports_parse_errors_with_line() {
    let temp_dir = tempfile::tempdir().unwrap();
    let scenario = create_temp_file(temp_dir.path(), "typo.scn", "read 0\nwirte 1 2\n");

    let output = Command::new(binary_path())
        .args(["run", scenario.to_str().unwrap()])
        .output()
        .expect("failed to run tmc4671-sim");

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("line 2: unknown step 'wirte'"));
}

#[test]
fn bundled_scenario_passes() {
    let scenario = Path::new(env!("CARGO_MANIFEST_DIR")).join("scenarios/chipinfo.scn");

    let status = Command::new(binary_path())
        .args(["run", scenario.to_str().unwrap()])
        .status()
        .expect("failed to run tmc4671-sim");

    assert!(status.success());
}

#[test]
fn encode_prints_word() {
    let output = Command::new(binary_path())
        .args(["encode", "write", "0x01", "2"])
        .output()
        .expect("failed to run tmc4671-sim");

    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "0x8100000002");
}

#[test]
fn encode_rejects_bad_direction_and_address() {
    let output = Command::new(binary_path())
        .args(["encode", "erase", "0x01", "2"])
        .output()
        .expect("failed to run tmc4671-sim");
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("[read, write]"));

    let output = Command::new(binary_path())
        .args(["encode", "read", "0x10", "0"])
        .output()
        .expect("failed to run tmc4671-sim");
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("0x10"));
}

#[test]
fn missing_command_prints_usage() {
    let output = Command::new(binary_path())
        .output()
        .expect("failed to run tmc4671-sim");

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Usage: tmc4671-sim"));
}
