//! End-to-end CLI tests for the registros binary.

#![allow(deprecated)]

mod support;
use support::socket_guard::start_mock_server_or_skip;

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

const PAYLOAD: &str = "{\"codigo\":\"V001\",\"peso\":10,\"fecha\":\"01/03/2024\",\"hora\":\"06:00\",\"turno\":\"am\"}\n\
{\"codigo\":\"V001\",\"peso\":8,\"fecha\":\"01/03/2024\",\"hora\":\"18:00\",\"turno\":\"pm\"}\n\
{\"codigo\":\"V002\",\"peso\":12,\"fecha\":\"02/03/2024\",\"hora\":\"06:00\",\"turno\":\"am\"}\n";

/// Command isolated from the user's config and data directories.
fn registros(tempdir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("registros").unwrap();
    cmd.env("XDG_CONFIG_HOME", tempdir.join("xdg-config"))
        .env("RUST_LOG", "warn")
        .arg("--data-dir")
        .arg(tempdir.join("data"));
    cmd
}

fn write_config(tempdir: &Path, contents: &str) {
    let dir = tempdir.join("xdg-config").join("registros");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("config.toml"), contents).unwrap();
}

fn import_payload(tempdir: &Path) {
    registros(tempdir)
        .arg("import")
        .write_stdin(PAYLOAD)
        .assert()
        .success()
        .stdout(predicate::str::contains("3 added"));
}

#[test]
fn test_binary_help_displays_usage() {
    let mut cmd = Command::cargo_bin("registros").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Offline-first capture"));
}

#[test]
fn test_binary_version_displays_version() {
    let mut cmd = Command::cargo_bin("registros").unwrap();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("registros"));
}

#[test]
fn test_binary_without_subcommand_fails() {
    let mut cmd = Command::cargo_bin("registros").unwrap();
    cmd.assert().failure().stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_import_then_list_and_status() {
    let tempdir = TempDir::new().unwrap();
    import_payload(tempdir.path());

    registros(tempdir.path())
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("V001|01/03/2024|06:00"))
        .stdout(predicate::str::contains("V002|02/03/2024|06:00"));

    registros(tempdir.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("pending = 3"))
        .stdout(predicate::str::contains("total = 3"));
}

#[test]
fn test_import_twice_adds_nothing_new() {
    let tempdir = TempDir::new().unwrap();
    import_payload(tempdir.path());

    registros(tempdir.path())
        .arg("import")
        .write_stdin(PAYLOAD)
        .assert()
        .success()
        .stdout(predicate::str::contains("0 added, 3 already stored"));
}

#[test]
fn test_import_from_file_argument() {
    let tempdir = TempDir::new().unwrap();
    let file = tempdir.path().join("registros.jsonl");
    std::fs::write(&file, PAYLOAD).unwrap();

    registros(tempdir.path())
        .arg("import")
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("3 added"));
}

#[test]
fn test_import_html_payload_fails() {
    let tempdir = TempDir::new().unwrap();
    registros(tempdir.path())
        .arg("import")
        .write_stdin("<html><body>captive portal</body></html>")
        .assert()
        .failure();
}

#[test]
fn test_summary_reports_daily_totals() {
    let tempdir = TempDir::new().unwrap();
    import_payload(tempdir.path());

    registros(tempdir.path())
        .arg("summary")
        .assert()
        .success()
        .stdout(predicate::str::contains("01/03/2024"))
        .stdout(predicate::str::contains("days = 2"))
        .stdout(predicate::str::contains("total = 30.00"))
        .stdout(predicate::str::contains("trend = "))
        .stdout(predicate::str::contains("range = all"))
        .stdout(predicate::str::contains("confidence = low"))
        .stdout(predicate::str::contains(
            "Not enough data for an accurate prediction",
        ));
}

#[test]
fn test_summary_range_excludes_old_records() {
    let tempdir = TempDir::new().unwrap();
    import_payload(tempdir.path());

    // the fixture readings are dated 2024, outside the last week
    registros(tempdir.path())
        .args(["summary", "--range", "week"])
        .assert()
        .success()
        .stdout(predicate::str::contains("range = week"))
        .stdout(predicate::str::contains("days = 0"))
        .stdout(predicate::str::contains("prediction = 0.00, 0.00, 0.00"))
        .stdout(predicate::str::contains("No data available"));

    registros(tempdir.path())
        .args(["summary", "--range", "decade"])
        .assert()
        .failure();
}

#[test]
fn test_remove_by_codigo_and_uid() {
    let tempdir = TempDir::new().unwrap();
    import_payload(tempdir.path());

    registros(tempdir.path())
        .args(["remove", "--codigo", "V001"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed 2 records"));

    registros(tempdir.path())
        .args(["remove", "V002|02/03/2024|06:00"])
        .assert()
        .success();

    registros(tempdir.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("total = 0"));
}

#[test]
fn test_repair_index_reports_count() {
    let tempdir = TempDir::new().unwrap();
    import_payload(tempdir.path());

    registros(tempdir.path())
        .arg("repair-index")
        .assert()
        .success()
        .stdout(predicate::str::contains("Index rebuilt with 3 records"));
}

#[test]
fn test_in_memory_run_leaves_no_files() {
    let tempdir = TempDir::new().unwrap();
    registros(tempdir.path())
        .arg("--in-memory")
        .arg("import")
        .write_stdin(PAYLOAD)
        .assert()
        .success()
        .stdout(predicate::str::contains("3 added"));
    assert!(!tempdir.path().join("data").exists());
}

#[test]
fn test_config_shows_defaults() {
    let tempdir = TempDir::new().unwrap();
    registros(tempdir.path())
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("not found (using defaults)"))
        .stdout(predicate::str::contains("data_host = http://192.168.4.1"))
        .stdout(predicate::str::contains("sync_concurrency = 2"));
}

#[test]
fn test_config_file_values_are_applied() {
    let tempdir = TempDir::new().unwrap();
    write_config(
        tempdir.path(),
        "data_host = \"10.0.0.5\"\nsync_concurrency = 4\nremote_sync_url = \"https://example.com/r\"\n",
    );
    registros(tempdir.path())
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("config_file = loaded"))
        .stdout(predicate::str::contains("data_host = http://10.0.0.5"))
        .stdout(predicate::str::contains("sync_concurrency = 4"))
        .stdout(predicate::str::contains("remote_sync_url = https://example.com/r"));
}

#[test]
fn test_invalid_config_fails_with_key_name() {
    let tempdir = TempDir::new().unwrap();
    write_config(tempdir.path(), "sync_concurrency = 99\n");
    registros(tempdir.path())
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("sync_concurrency"));
}

#[test]
fn test_sync_without_remote_fails() {
    let tempdir = TempDir::new().unwrap();
    registros(tempdir.path())
        .arg("sync")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No remote sync URL configured"));
}

#[tokio::test]
async fn test_download_from_mock_device() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/data"))
        .respond_with(ResponseTemplate::new(200).set_body_string(PAYLOAD))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/confirmar"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let tempdir = TempDir::new().unwrap();
    registros(tempdir.path())
        .args(["download", "--host", &mock_server.uri()])
        .assert()
        .success()
        .stdout(predicate::str::contains("3 added"))
        .stdout(predicate::str::contains("Receipt confirmed"));
}

#[tokio::test]
async fn test_sync_to_mock_remote() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("POST"))
        .and(path("/api/registros"))
        .respond_with(ResponseTemplate::new(201))
        .expect(3)
        .mount(&mock_server)
        .await;

    let tempdir = TempDir::new().unwrap();
    import_payload(tempdir.path());

    let remote = format!("{}/api/registros", mock_server.uri());
    registros(tempdir.path())
        .args(["sync", "--remote", &remote])
        .assert()
        .success()
        .stdout(predicate::str::contains("3 sent, 0 failed"));

    registros(tempdir.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("synced = 3"));
}
