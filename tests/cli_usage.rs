use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;

fn passkeeper() -> Command {
    Command::cargo_bin("passkeeper").expect("binary exists")
}

#[test]
fn no_subcommand_prints_help_and_exits_usage() {
    passkeeper()
        .assert()
        .code(64)
        .stdout(predicate::str::contains("zero-knowledge password manager"));
}

#[test]
fn unknown_subcommand_exits_usage() {
    passkeeper().arg("frobnicate").assert().code(64);
}

#[test]
fn version_flag_succeeds() {
    passkeeper()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("passkeeper"));
}

#[test]
fn status_reports_no_session_on_a_fresh_data_dir() {
    let data_dir = tempfile::tempdir().expect("temp data dir");

    let output = passkeeper()
        .env("PASSKEEPER_DATA_DIR", data_dir.path())
        .env("PASSKEEPER_CONFIG", data_dir.path().join("config.toml"))
        .args(["status", "--json"])
        .output()
        .expect("status output");

    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let json: Value = serde_json::from_str(&stdout).expect("valid json");
    assert_eq!(json["value"], "no active session");
    assert_eq!(json["meta"]["session"], false);
}

#[test]
fn vault_commands_without_a_session_exit_usage() {
    let data_dir = tempfile::tempdir().expect("temp data dir");

    passkeeper()
        .env("PASSKEEPER_DATA_DIR", data_dir.path())
        .env("PASSKEEPER_CONFIG", data_dir.path().join("config.toml"))
        .arg("list")
        .assert()
        .code(64)
        .stderr(predicate::str::contains("No active session"));
}

#[test]
fn serve_without_a_token_secret_exits_usage() {
    let data_dir = tempfile::tempdir().expect("temp data dir");

    passkeeper()
        .env("PASSKEEPER_DATA_DIR", data_dir.path())
        .env("PASSKEEPER_CONFIG", data_dir.path().join("config.toml"))
        .env_remove("PASSKEEPER_TOKEN_SECRET")
        .arg("serve")
        .assert()
        .code(64)
        .stderr(predicate::str::contains("token secret"));
}
