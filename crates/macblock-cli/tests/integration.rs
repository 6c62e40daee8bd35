//! Integration tests for the macblock CLI surface.
//!
//! These exercise argument parsing and the error contract (`error: <msg>`
//! on stderr, exit 1 for user errors) without touching system state.

use assert_cmd::Command;
use predicates::prelude::*;

fn macblock() -> Command {
    Command::cargo_bin("macblock").expect("binary builds")
}

#[test]
fn help_lists_the_command_surface() {
    macblock()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("install"))
        .stdout(predicate::str::contains("enable"))
        .stdout(predicate::str::contains("pause"))
        .stdout(predicate::str::contains("update"))
        .stdout(predicate::str::contains("doctor"));
}

#[test]
fn version_prints() {
    macblock()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("macblock"));
}

#[test]
fn pause_rejects_malformed_durations() {
    macblock()
        .args(["pause", "10x"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::starts_with("error: "))
        .stderr(predicate::str::contains("invalid duration"));
}

#[test]
fn pause_rejects_missing_unit() {
    macblock()
        .args(["pause", "10"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("invalid duration"));
}

#[test]
fn allow_add_rejects_invalid_domains() {
    macblock()
        .args(["allow", "add", "not a domain"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::starts_with("error: "));
}

#[test]
fn deny_add_rejects_bare_hostnames() {
    macblock()
        .args(["deny", "add", "localhost"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("fully-qualified"));
}

#[test]
fn sources_set_rejects_unknown_names() {
    macblock()
        .args(["sources", "set", "no-such-source"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("unknown source"));
}

#[test]
fn sources_set_rejects_plain_http() {
    macblock()
        .args(["sources", "set", "http://lists.example.com/hosts"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("https"));
}

#[test]
fn sources_list_shows_the_catalog() {
    macblock()
        .args(["sources", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("stevenblack"));
}

#[test]
fn upstreams_set_rejects_garbage_and_loopback() {
    macblock()
        .args(["upstreams", "set", "not-an-ip"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("not an IP address"));

    macblock()
        .args(["upstreams", "set", "127.0.0.1"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("loopback"));
}

#[test]
fn test_command_rejects_invalid_domains() {
    macblock()
        .args(["test", "...."])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::starts_with("error: "));
}

#[test]
fn status_runs_without_an_install() {
    macblock()
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Blocking:"));
}
