//! Integration tests for the `airly` binary: argument parsing, help,
//! completions and configuration errors. Nothing here talks to the cloud.
#![allow(clippy::unwrap_used)]

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

/// An `airly` command isolated from the user's config and environment.
fn airly_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("airly");
    cmd.env("HOME", "/tmp/airly-cli-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/airly-cli-test-nonexistent")
        .env("XDG_DATA_HOME", "/tmp/airly-cli-test-nonexistent")
        .env_remove("AIRLY_PROFILE")
        .env_remove("AIRLY_OUTPUT")
        .env_remove("AIRLY_USERNAME")
        .env_remove("AIRLY_PASSWORD")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn no_args_shows_help() {
    airly_cmd()
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn help_lists_commands() {
    airly_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("SystemAIR")
            .and(predicate::str::contains("units"))
            .and(predicate::str::contains("mode"))
            .and(predicate::str::contains("duration")),
    );
}

#[test]
fn completions_for_bash() {
    airly_cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("airly"));
}

#[test]
fn unknown_mode_is_a_usage_error() {
    airly_cmd()
        .args(["mode", "kitchen", "turbo"])
        .assert()
        .code(2);
}

#[test]
fn unknown_airflow_label_is_a_usage_error() {
    airly_cmd()
        .args(["airflow", "kitchen", "max"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("unknown airflow level"));
}

#[test]
fn missing_credentials_exit_with_auth_code() {
    airly_cmd()
        .args(["units", "list"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("No credentials"));
}

#[test]
fn unknown_profile_is_reported() {
    airly_cmd()
        .args(["--profile", "cabin", "units", "list"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("cabin"));
}

#[test]
fn config_path_prints_toml_location() {
    airly_cmd()
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}
