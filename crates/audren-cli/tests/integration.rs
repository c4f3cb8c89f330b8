//! Integration tests for audren-cli.
//!
//! Each test runs the built `audren` binary.

use std::path::PathBuf;
use std::process::Command;

use tempfile::TempDir;

/// Helper to get the path to the `audren` binary built by cargo.
fn audren_bin() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_audren"));
    command.env("RUST_LOG", "warn");
    command
}

fn demo(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../demos")
        .join(name)
}

// ---------------------------------------------------------------------------
// audren simulate
// ---------------------------------------------------------------------------

#[test]
fn simulate_star_scenario() {
    let output = audren_bin()
        .arg("simulate")
        .arg(demo("star.toml"))
        .arg("--plan")
        .output()
        .expect("failed to run audren simulate");

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(stdout.contains("frame    0: resorted=true"), "got: {stdout}");
    assert!(stdout.contains("frame    1: resorted=false"), "got: {stdout}");
    assert!(stdout.contains("final-mix"), "got: {stdout}");
    assert!(stdout.contains("Simulated 3 frame(s), 0 absorbed error(s)"), "got: {stdout}");
}

#[test]
fn simulate_splitter_retarget_reorders() {
    let output = audren_bin()
        .arg("simulate")
        .arg(demo("splitter.toml"))
        .output()
        .expect("failed to run audren simulate");

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    let frames: Vec<&str> = stdout.lines().filter(|l| l.starts_with("frame")).collect();
    assert_eq!(frames.len(), 2, "got: {stdout}");
    assert!(frames[1].contains("resorted=true"), "got: {stdout}");
}

#[test]
fn simulate_reports_cycle_as_failure() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cycle.toml");
    std::fs::write(
        &path,
        r#"
        [config.renderer]
        sub_mix_count = 2
        effect_count = 0
        sink_count = 0
        splitter_count = 1
        splitter_destination_count = 1

        [[frames]]
        [[frames.mixes]]
        id = 0
        [[frames.mixes]]
        id = 1
        destination = 2
        [[frames.mixes]]
        id = 2
        destination = 1
        "#,
    )
    .unwrap();

    let output = audren_bin()
        .arg("simulate")
        .arg(&path)
        .output()
        .expect("failed to run audren simulate");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("frame 0"), "got: {stderr}");
}

#[test]
fn simulate_missing_scenario_fails() {
    let output = audren_bin()
        .args(["simulate", "definitely-not-a-scenario-4711"])
        .output()
        .expect("failed to run audren simulate");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("not found"));
}

// ---------------------------------------------------------------------------
// audren check-config
// ---------------------------------------------------------------------------

#[test]
fn check_config_init_writes_valid_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("conf").join("engine.toml");

    let output = audren_bin()
        .arg("check-config")
        .arg(&path)
        .arg("--init")
        .output()
        .expect("failed to run audren check-config");

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert!(path.is_file());
    assert!(String::from_utf8_lossy(&output.stdout).contains("OK"));
}

#[test]
fn check_config_lists_every_problem() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("engine.toml");
    std::fs::write(
        &path,
        "[renderer]\nsample_rate = 44100\nrevision = 0\n\n[driver]\nchannel_count = 3\n",
    )
    .unwrap();

    let output = audren_bin()
        .arg("check-config")
        .arg(&path)
        .output()
        .expect("failed to run audren check-config");

    assert!(!output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("renderer.sample_rate"), "got: {stdout}");
    assert!(stdout.contains("renderer.revision"), "got: {stdout}");
    assert!(stdout.contains("driver.channel_count"), "got: {stdout}");
    assert!(String::from_utf8_lossy(&output.stderr).contains("3 problems"));
}

// ---------------------------------------------------------------------------
// audren play
// ---------------------------------------------------------------------------

#[test]
fn play_with_mock_backend_plays_every_frame() {
    let output = audren_bin()
        .args(["play", "--mock", "--duration", "0.05"])
        .output()
        .expect("failed to run audren play");

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("'mock'"), "got: {stdout}");
    assert!(stdout.contains("Played 2400 of 2400 frames"), "got: {stdout}");
    assert!(stdout.contains("0 anomalies"), "got: {stdout}");
}
