//! Integration tests for core CLI contract behavior.

use predicates::prelude::*;

fn cli_cmd() -> assert_cmd::Command {
    assert_cmd::Command::cargo_bin("artemis-loader").expect("binary should build")
}

#[test]
fn help_exits_zero_and_writes_stdout_only() {
    let mut cmd = cli_cmd();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("artemis-loader"));
}

#[test]
fn short_help_exits_zero_and_writes_stdout_only() {
    let mut cmd = cli_cmd();
    cmd.arg("-h")
        .assert()
        .success()
        .stdout(predicate::str::contains("artemis-loader"));
}

#[test]
fn version_exits_zero() {
    let mut cmd = cli_cmd();
    cmd.arg("--version").assert().success();
}

#[test]
fn short_version_exits_zero() {
    let mut cmd = cli_cmd();
    cmd.arg("-V").assert().success();
}

#[test]
fn list_ports_succeeds_without_hardware() {
    let mut cmd = cli_cmd();
    cmd.arg("list-ports").assert().success();
}

#[test]
fn upload_missing_file_fails_with_message() {
    let mut cmd = cli_cmd();
    cmd.args([
        "--port",
        "/dev/null",
        "upload",
        "/tmp/not_exists_for_contract_test.bin",
    ])
    .assert()
    .failure()
    .stderr(predicate::str::contains("Error"));
}

#[test]
fn update_bootloader_missing_file_fails_with_message() {
    let mut cmd = cli_cmd();
    cmd.args([
        "--port",
        "/dev/null",
        "update-bootloader",
        "/tmp/not_exists_for_contract_test_svl.bin",
    ])
    .assert()
    .failure()
    .stderr(predicate::str::contains("Error"));
}

#[test]
fn completions_bash_writes_to_stdout() {
    let mut cmd = cli_cmd();
    cmd.args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("artemis-loader"));
}

#[test]
fn missing_subcommand_fails() {
    let mut cmd = cli_cmd();
    cmd.assert().failure();
}
