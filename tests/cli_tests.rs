//! CLI integration tests
//!
//! Tests the command-line interface using assert_cmd. Networked
//! subcommands (scan, listen, send, call) are covered by the fabric
//! tests; here we stick to what runs without a network.

use assert_cmd::Command;
use predicates::prelude::*;

/// Get a command for the modlink binary
fn modlink_cmd() -> Command {
    Command::cargo_bin("modlink").unwrap()
}

// ─────────────────────────────────────────────────────────────────
// Help and Version Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_help_flag() {
    modlink_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("scan"))
        .stdout(predicate::str::contains("listen"))
        .stdout(predicate::str::contains("send"))
        .stdout(predicate::str::contains("call"))
        .stdout(predicate::str::contains("config"))
        .stdout(predicate::str::contains("version"));
}

#[test]
fn test_version_command() {
    modlink_cmd()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("modlink"))
        .stdout(predicate::str::contains("commit:"))
        .stdout(predicate::str::contains("target:"));
}

#[test]
fn test_short_version_flag() {
    modlink_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("modlink"));
}

#[test]
fn test_unknown_command_fails() {
    modlink_cmd().arg("frobnicate").assert().failure();
}

// ─────────────────────────────────────────────────────────────────
// Config Command Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_config_show_defaults_without_file() {
    modlink_cmd()
        .args(["--config", "/nonexistent/modlink.toml", "config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[module]"))
        .stdout(predicate::str::contains("[discovery]"))
        .stdout(predicate::str::contains("[transport]"))
        .stdout(predicate::str::contains("tcp_port = 3001"));
}

#[test]
fn test_config_init_creates_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");

    modlink_cmd()
        .args(["config", "init", "--path"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration written"));

    assert!(path.exists());
    let contents = std::fs::read_to_string(&path).unwrap();
    assert!(contents.contains("service_name"));
}

#[test]
fn test_config_init_refuses_overwrite() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "# existing\n").unwrap();

    modlink_cmd()
        .args(["config", "init", "--path"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    // The existing file is untouched
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "# existing\n");
}

#[test]
fn test_config_init_force_overwrites() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "# existing\n").unwrap();

    modlink_cmd()
        .args(["config", "init", "--force", "--path"])
        .arg(&path)
        .assert()
        .success();

    let contents = std::fs::read_to_string(&path).unwrap();
    assert!(contents.contains("[module]"));
}

#[test]
fn test_config_validate_good_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[module]\nid = 4\n").unwrap();

    modlink_cmd()
        .arg("--config")
        .arg(&path)
        .args(["config", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("valid"));
}

#[test]
fn test_config_validate_bad_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[messaging]\ninbound_queue_size = 0\n").unwrap();

    modlink_cmd()
        .arg("--config")
        .arg(&path)
        .args(["config", "validate"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid"));
}

#[test]
fn test_config_validate_unparseable_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "not toml at all [[[").unwrap();

    modlink_cmd()
        .arg("--config")
        .arg(&path)
        .args(["config", "validate"])
        .assert()
        .failure();
}
