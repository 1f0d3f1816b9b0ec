//! Smoke tests -- verify the binary runs and the CLI surface holds.

use assert_cmd::Command;

#[test]
fn test_cli_help() {
    Command::cargo_bin("formpilot")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicates::str::contains(
            "Deadline-precise Google Forms auto-fill and submission",
        ));
}

#[test]
fn test_cli_version() {
    Command::cargo_bin("formpilot")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicates::str::contains("formpilot"));
}

#[test]
fn test_run_subcommand_exists() {
    Command::cargo_bin("formpilot")
        .unwrap()
        .args(["run", "--help"])
        .assert()
        .success();
}

#[test]
fn test_check_config_subcommand_exists() {
    Command::cargo_bin("formpilot")
        .unwrap()
        .args(["check-config", "--help"])
        .assert()
        .success();
}

#[test]
fn test_next_run_subcommand_exists() {
    Command::cargo_bin("formpilot")
        .unwrap()
        .args(["next-run", "--help"])
        .assert()
        .success();
}

#[test]
fn test_now_and_delay_conflict() {
    Command::cargo_bin("formpilot")
        .unwrap()
        .args(["run", "--now", "--delay", "5"])
        .assert()
        .failure();
}

#[test]
fn test_zero_delay_rejected() {
    Command::cargo_bin("formpilot")
        .unwrap()
        .args(["run", "--delay", "0"])
        .assert()
        .failure();
}

#[test]
fn test_missing_config_exits_nonzero() {
    Command::cargo_bin("formpilot")
        .unwrap()
        .args(["check-config", "--config", "definitely-not-here.json"])
        .assert()
        .failure()
        .stderr(predicates::str::contains("definitely-not-here.json"));
}

#[test]
fn test_invalid_config_exits_nonzero() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("config.json");
    // Six URLs: one short of the required Monday..Sunday seven.
    std::fs::write(
        &path,
        r#"{
            "user": { "name": "test" },
            "forms": {
                "urls": ["https://a", "https://b", "https://c", "https://d", "https://e", "https://f"],
                "weekdays": ["三"]
            }
        }"#,
    )
    .unwrap();

    Command::cargo_bin("formpilot")
        .unwrap()
        .args(["check-config", "--config"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicates::str::contains("7"));
}

#[test]
fn test_valid_config_passes_check() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("config.json");
    let urls: Vec<String> = (0..7)
        .map(|i| format!("\"https://docs.google.com/forms/d/e/example{i}/viewform\""))
        .collect();
    std::fs::write(
        &path,
        format!(
            r#"{{
                "user": {{ "name": "王小明" }},
                "forms": {{ "urls": [{}], "weekdays": ["三"] }}
            }}"#,
            urls.join(", ")
        ),
    )
    .unwrap();

    Command::cargo_bin("formpilot")
        .unwrap()
        .args(["check-config", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicates::str::contains("Configuration OK"));
}
