#[path = "common/mod.rs"]
mod common;

use assert_cmd::Command;
use predicates::str::contains;

fn pact_mock_service() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("pact-mock-service"))
}

#[test]
fn version_subcommand_reports_the_package_version() {
    pact_mock_service()
        .arg("version")
        .assert()
        .success()
        .stdout(contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn version_flag_matches_the_subcommand() {
    pact_mock_service()
        .arg("--version")
        .assert()
        .success()
        .stdout(contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn help_lists_the_service_options() {
    pact_mock_service()
        .args(["service", "--help"])
        .assert()
        .success()
        .stdout(contains("--consumer"))
        .stdout(contains("--pact-dir"));
}

#[test]
fn ssl_without_a_certificate_is_refused() {
    // Argument validation happens before any state is touched, so no
    // pid directory is needed.
    pact_mock_service()
        .args(["start", "--ssl", "--port", "65001"])
        .assert()
        .failure()
        .code(1)
        .stdout(contains("--sslcert"));
}

#[test]
fn unknown_write_mode_is_rejected() {
    pact_mock_service()
        .args(["start", "--pact-file-write-mode", "append"])
        .assert()
        .failure()
        .stderr(contains("invalid pact file write mode"));
}

#[test]
fn unknown_specification_version_is_rejected() {
    pact_mock_service()
        .args(["start", "--pact-specification-version", "3"])
        .assert()
        .failure()
        .stderr(contains("only versions 1 and 2 are supported"));
}

#[test]
fn unknown_subcommand_is_rejected() {
    pact_mock_service().arg("purge").assert().failure();
}
