//! CLI tests against fixtures in a temporary directory.

#![allow(deprecated)] // Command::cargo_bin is deprecated but replacement requires newer assert_cmd

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const PROFILE: &str = r#"{
    "callerId": "user001",
    "organization": "acme",
    "department": "engineering",
    "role": "user",
    "dataClassification": "internal"
}"#;

fn warden(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("warden").unwrap();
    cmd.current_dir(dir);
    cmd
}

#[test]
fn help_flag_shows_usage() {
    let temp = TempDir::new().unwrap();
    warden(temp.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("access control decisions"));
}

#[test]
fn config_check_reports_invalid_hours() {
    let temp = TempDir::new().unwrap();
    fs::write(
        temp.path().join("warden.toml"),
        "[time_restriction.business_hours]\nstart_hour = 18\nend_hour = 9\n",
    )
    .unwrap();

    warden(temp.path())
        .args(["config", "check", "--project", "."])
        .assert()
        .failure()
        .stdout(predicate::str::contains("error:"));
}

#[test]
fn config_show_json() {
    let temp = TempDir::new().unwrap();
    warden(temp.path())
        .args(["config", "show", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"max_filter_size\": 1000"));
}

#[test]
fn check_public_record_allowed() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("caller.json"), PROFILE).unwrap();
    fs::write(
        temp.path().join("record.json"),
        r#"{ "recordId": "handbook", "allowedUsers": ["public"], "allowedOrganizations": ["public"], "allowedDepartments": ["public"] }"#,
    )
    .unwrap();

    warden(temp.path())
        .args([
            "check",
            "--profile",
            "caller.json",
            "--record",
            "record.json",
            "--at",
            "2025-06-10T01:00:00Z",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"allowed\": true"));
}

#[test]
fn filter_prints_bool_query() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("caller.json"), PROFILE).unwrap();

    warden(temp.path())
        .args(["filter", "--profile", "caller.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"bool\""));
}

#[test]
fn decide_after_hours_denied() {
    let temp = TempDir::new().unwrap();
    let request = PROFILE.replacen(
        '{',
        r#"{ "query": "*", "networkOrigin": "203.0.113.10", "sessionId": "s-1","#,
        1,
    );
    fs::write(temp.path().join("request.json"), request).unwrap();
    fs::write(temp.path().join("hits.json"), "[]").unwrap();
    fs::write(
        temp.path().join("locations.json"),
        r#"[{ "range": "203.0.113.0/24", "countryCode": "JP", "region": "Tokyo" }]"#,
    )
    .unwrap();

    warden(temp.path())
        .args([
            "decide",
            "--request",
            "request.json",
            "--records",
            "hits.json",
            "--locations",
            "locations.json",
            "--at",
            "2025-06-10T11:00:00Z",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"allowed\": false"))
        .stdout(predicate::str::contains("time restriction"));
}
