//! Integration tests for the `lidarctl` binary.
//!
//! These cover argument parsing, completions, status rendering and the
//! profile commands. Nothing here launches a subsystem or touches a
//! network interface.
#![allow(clippy::unwrap_used)]

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `lidarctl` binary with env isolation.
///
/// Clears all `LIDARCTL_*` variables and points the home directories at
/// a nonexistent path so tests never touch a real configuration.
fn lidarctl_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("lidarctl");
    cmd.env("HOME", "/tmp/lidarctl-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/lidarctl-test-nonexistent")
        .env("XDG_STATE_HOME", "/tmp/lidarctl-test-nonexistent")
        .env_remove("LIDARCTL_PROFILE")
        .env_remove("LIDARCTL_CONFIG_DIR")
        .env_remove("LIDARCTL_LOG_FILE")
        .env_remove("LIDARCTL_OUTPUT")
        .env_remove("RUST_LOG");
    cmd
}

/// Same, with `--config-dir` pointed at a scratch directory.
fn in_dir(dir: &TempDir) -> assert_cmd::Command {
    let mut cmd = lidarctl_cmd();
    cmd.arg("--config-dir").arg(dir.path());
    cmd
}

fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = lidarctl_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_flag() {
    lidarctl_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("LiDAR appliance")
            .and(predicate::str::contains("setup"))
            .and(predicate::str::contains("client"))
            .and(predicate::str::contains("status")),
    );
}

#[test]
fn test_version_flag() {
    lidarctl_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("lidarctl"));
}

#[test]
fn test_client_requires_interface() {
    let output = lidarctl_cmd().arg("client").output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("--lidar-network-interface"));
}

// ── Shell completions ───────────────────────────────────────────────

#[test]
fn test_completions_bash() {
    lidarctl_cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("lidarctl"));
}

#[test]
fn test_completions_invalid_shell() {
    lidarctl_cmd()
        .args(["completions", "tcsh"])
        .assert()
        .failure()
        .code(2);
}

// ── Status ──────────────────────────────────────────────────────────

#[test]
fn test_status_json_uses_builtin_profile() {
    let dir = TempDir::new().unwrap();
    let output = in_dir(&dir)
        .args(["status", "-o", "json"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", combined_output(&output));

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["lidar_ip_address"], "192.168.20.20");
    assert_eq!(json["profile"], "default");
    assert_eq!(json["menu"]["title"], "Lidar client");
    assert_eq!(json["subsystems"].as_array().unwrap().len(), 4);
}

#[test]
fn test_status_plain_lists_stopped_subsystems() {
    let dir = TempDir::new().unwrap();
    in_dir(&dir)
        .args(["st", "-o", "plain"])
        .assert()
        .success()
        .stdout(predicate::str::contains("power Stopped").and(predicate::str::contains("playback Stopped")));
}

#[test]
fn test_status_setup_menu_blocks_link_up() {
    let dir = TempDir::new().unwrap();
    in_dir(&dir)
        .args(["status", "--setup", "--color", "never"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Required – select network interface"));
}

#[test]
fn test_unknown_profile_is_not_found() {
    let dir = TempDir::new().unwrap();
    let output = in_dir(&dir)
        .args(["-p", "nowhere", "status"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(4));
    assert!(combined_output(&output).contains("nowhere"));
}

// ── Config ──────────────────────────────────────────────────────────

#[test]
fn test_profile_round_trip() {
    let dir = TempDir::new().unwrap();

    in_dir(&dir)
        .args(["config", "save", "lab", "--interface", "eth1"])
        .assert()
        .success();
    in_dir(&dir)
        .args(["config", "save", "bench", "--lidar-ip", "10.0.0.7"])
        .assert()
        .success();

    in_dir(&dir)
        .args(["config", "profiles", "-o", "plain"])
        .assert()
        .success()
        .stdout("bench\nlab\n");

    // The first saved profile became the default.
    in_dir(&dir)
        .args(["status", "-o", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("eth1"));

    in_dir(&dir).args(["config", "use", "bench"]).assert().success();
    in_dir(&dir)
        .args(["status", "-o", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("10.0.0.7"));
}

#[test]
fn test_config_set_updates_active_profile() {
    let dir = TempDir::new().unwrap();
    in_dir(&dir)
        .args(["config", "set", "container_name", "bench-sdk"])
        .assert()
        .success();
    in_dir(&dir)
        .args(["config", "show", "-o", "json"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("bench-sdk")
                .and(predicate::str::contains(r#""default_profile": "default""#)),
        );
}

#[test]
fn test_config_set_unknown_key_is_usage_error() {
    let dir = TempDir::new().unwrap();
    let output = in_dir(&dir)
        .args(["config", "set", "grace_period_ms", "10"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("unknown key"));
}

#[test]
fn test_config_use_missing_profile() {
    let dir = TempDir::new().unwrap();
    let output = in_dir(&dir)
        .args(["config", "use", "ghost"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(4));
}
