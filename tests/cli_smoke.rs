//! Smoke tests for the pgstash CLI binary.
//! These check argument parsing and the commands that need no database.

use assert_cmd::Command;
use predicates::prelude::*;

/// Returns the path to the CLI binary (builds if needed)
fn cli_bin() -> Command {
    let mut cmd = Command::cargo_bin("pgstash").expect("binary should build");
    cmd.env_remove("RUST_LOG");
    cmd
}

#[test]
fn prints_help() {
    let mut cmd = cli_bin();
    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Usage"))
        .stdout(predicate::str::contains("backup"))
        .stdout(predicate::str::contains("restore"));
}

#[test]
fn prints_version() {
    let mut cmd = cli_bin();
    cmd.arg("--version");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("pgstash"));
}

#[test]
fn rejects_unknown_command() {
    let mut cmd = cli_bin();
    cmd.arg("not-a-real-command");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn config_prints_resolved_yaml() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.pgstash.yml");
    std::fs::write(
        &path,
        "url: postgresql://localhost/app\nlocation: file/{table}\ntables: [public.store]\n",
    )
    .unwrap();

    let mut cmd = cli_bin();
    cmd.args(["-c", path.to_str().unwrap(), "-l", "cli/{table}", "config"]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("public.store"))
        .stdout(predicate::str::contains("cli/{table}"))
        .stdout(predicate::str::contains("file/{table}").not());
}

#[test]
fn config_reads_stdin() {
    let mut cmd = cli_bin();
    cmd.args(["-c", "absent.pgstash.yml", "--stdin", "--raw-config-format", "json", "config"])
        .write_stdin(r#"{"tables": ["public.from_stdin"]}"#);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("public.from_stdin"));
}

#[test]
fn url_and_connection_conflict() {
    let mut cmd = cli_bin();
    cmd.args(["-u", "postgresql://a/b", "--conn", "other", "config"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Conflicting options"));
}

#[test]
fn unsupported_config_format_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.ini");
    std::fs::write(&path, "[backup]\n").unwrap();

    let mut cmd = cli_bin();
    cmd.args(["-c", path.to_str().unwrap(), "config"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Unsupported config format"));
}
