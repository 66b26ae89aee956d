//! Tests for the `table create`/`table drop` subcommands.

use assert_cmd::Command;
use std::io::Write;
use tempfile::TempDir;

fn write_config(dir: &TempDir, db_path: &std::path::Path) -> std::path::PathBuf {
    let config_path = dir.path().join("config.toml");
    let mut file = std::fs::File::create(&config_path).unwrap();
    write!(
        file,
        r#"
db_path = "{db}"
http_port = 8080
intake_prefix = "/intake"
required_approvers = ["alice", "bob"]
admins = ["alice"]
production_host = "prod.example.com"
production_user = "deploy"
production_password = "secret"

[ci]
api_url = "https://api.github.com"
token = "token"
owner = "example-org"
repo = "example-repo"

[identity]
"#,
        db = db_path.display(),
    )
    .unwrap();
    config_path
}

#[test]
fn table_create_then_drop_round_trips() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let config_path = write_config(&temp_dir, &db_path);

    let mut create_cmd = Command::cargo_bin("release-orchestrator").unwrap();
    create_cmd
        .arg("--config")
        .arg(&config_path)
        .arg("table")
        .arg("create");
    create_cmd.assert().success();

    let mut drop_cmd = Command::cargo_bin("release-orchestrator").unwrap();
    drop_cmd
        .arg("--config")
        .arg(&config_path)
        .arg("table")
        .arg("drop");
    drop_cmd.assert().success();
}

#[test]
fn missing_config_file_fails_with_a_clear_error() {
    let mut cmd = Command::cargo_bin("release-orchestrator").unwrap();
    cmd.arg("--config")
        .arg("/nonexistent/release-orchestrator.toml")
        .arg("table")
        .arg("create");
    cmd.assert().failure();
}
