use assert_cmd::prelude::*;
use predicates::prelude::*;
use shutter_cli::AppConfig;
use std::process::Command;

fn shutter() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("shutter"));
    for key in [
        "SHUTTER_DATABASE_URL",
        "SHUTTER_BIND",
        "TYPESENSE_HOST",
        "TYPESENSE_PORT",
        "JINA_API_KEY",
        "VISION_API_KEY",
    ] {
        cmd.env_remove(key);
    }
    cmd
}

#[test]
fn init_config_writes_loadable_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shutter.toml");

    shutter()
        .args(["init-config", "--output"])
        .arg(&path)
        .assert()
        .success();

    let written = AppConfig::from_file(&path).unwrap();
    assert_eq!(written, AppConfig::default());

    shutter()
        .args(["init-config", "--output"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));

    shutter()
        .args(["init-config", "--force", "--output"])
        .arg(&path)
        .assert()
        .success();
}

#[test]
fn stats_runs_against_in_process_backends() {
    let dir = tempfile::tempdir().unwrap();
    shutter()
        .arg("--config")
        .arg(dir.path().join("missing.toml"))
        .arg("stats")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"outboxPending\": 0"));
}

#[test]
fn postgres_without_url_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shutter.toml");
    std::fs::write(&path, "[store]\nbackend = \"postgres\"\n").unwrap();

    shutter()
        .arg("--config")
        .arg(&path)
        .arg("provision")
        .assert()
        .failure()
        .stderr(predicate::str::contains("SHUTTER_DATABASE_URL"));
}
