//! CLI integration tests for bundleman admin commands.
//!
//! Each test uses an isolated temp directory for the database, ensuring tests
//! can run in parallel safely.

#![allow(deprecated)] // Command::cargo_bin deprecation only affects custom build dirs

use assert_cmd::Command;
use assert_fs::TempDir;
use predicates::prelude::*;

fn cmd() -> Command {
    let mut cmd = Command::cargo_bin("bundleman").expect("failed to find binary");
    cmd.env("NO_COLOR", "1");
    cmd
}

#[test]
fn test_admin_init_creates_database() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let data_dir = temp_dir.path().to_string_lossy().to_string();

    cmd()
        .args(["admin", "init", "--data-dir", &data_dir])
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialized registry database"));

    assert!(temp_dir.path().join("bundleman.db").exists());
}

#[test]
fn test_admin_import_seeds_devices_and_apps() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let data_dir = temp_dir.path().to_string_lossy().to_string();

    let devices_path = temp_dir.path().join("devices.json");
    std::fs::write(
        &devices_path,
        r#"[
            {"codename": "alpha", "display_name": "Pixel 6", "status": "completed",
             "properties": {"ro.product.model": "Pixel 6"}},
            {"codename": "beta", "display_name": "Pixel 8"}
        ]"#,
    )
    .unwrap();

    let apps_path = temp_dir.path().join("apps.json");
    std::fs::write(
        &apps_path,
        r#"[
            {"name": "tunnel", "package_id": "org.example.tunnel", "auto_update": true,
             "is_bundled": true}
        ]"#,
    )
    .unwrap();

    cmd()
        .args(["admin", "import", "--data-dir", &data_dir])
        .arg("--devices")
        .arg(&devices_path)
        .arg("--apps")
        .arg(&apps_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Imported 2 device profile(s)"))
        .stdout(predicate::str::contains("Imported 1 tracked app(s)"));
}

#[test]
fn test_admin_import_requires_input() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let data_dir = temp_dir.path().to_string_lossy().to_string();

    cmd()
        .args(["admin", "import", "--data-dir", &data_dir])
        .assert()
        .failure()
        .stderr(predicate::str::contains("nothing to import"));
}

#[test]
fn test_run_with_missing_config_fails() {
    cmd()
        .args(["run", "--config", "/nonexistent/bundleman.toml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("loading /nonexistent/bundleman.toml"));
}
