//! Configuration system tests
//!
//! Tests configuration loading, validation, and environment overrides

mod common;

use std::fs;
use std::path::PathBuf;

use common::{bot_cmd, invalid_config_fixture, valid_config_fixture};
use predicates::prelude::*;
use tempfile::TempDir;

/// Test fixture for configuration testing
struct ConfigFixture {
    _temp_dir: TempDir,
    config_path: PathBuf,
}

impl ConfigFixture {
    fn new(content: &str) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, content).unwrap();
        Self {
            _temp_dir: temp_dir,
            config_path,
        }
    }

    fn validate(&self) -> assert_cmd::assert::Assert {
        bot_cmd()
            .arg("config")
            .arg("validate")
            .arg("--config")
            .arg(&self.config_path)
            .assert()
    }
}

// ─────────────────────────────────────────────────────────────────
// Valid Configuration Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_builtin_ids_only_config() {
    ConfigFixture::new(
        r#"
[feed]
music_app_id = "111"
podcast_app_id = "222"
"#,
    )
    .validate()
    .success();
}

#[test]
fn test_valid_fixture() {
    bot_cmd()
        .arg("config")
        .arg("validate")
        .arg("--config")
        .arg(valid_config_fixture())
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"));
}

#[test]
fn test_show_reflects_file_values() {
    bot_cmd()
        .arg("config")
        .arg("show")
        .arg("--config")
        .arg(valid_config_fixture())
        .assert()
        .success()
        .stdout(predicate::str::contains("interval_secs = 3600"))
        .stdout(predicate::str::contains("run_on_start = false"));
}

#[test]
fn test_env_overrides_file() {
    bot_cmd()
        .env("PRESENCE_ROLES_SYNC_INTERVAL_SECS", "120")
        .env("PRESENCE_ROLES_FEED_URL", "https://other.example.com/players.json")
        .arg("config")
        .arg("show")
        .arg("--config")
        .arg(valid_config_fixture())
        .assert()
        .success()
        .stdout(predicate::str::contains("interval_secs = 120"))
        .stdout(predicate::str::contains("https://other.example.com/players.json"));
}

#[test]
fn test_config_path_from_env() {
    bot_cmd()
        .env("PRESENCE_ROLES_CONFIG", valid_config_fixture())
        .arg("config")
        .arg("show")
        .assert()
        .success()
        .stdout(predicate::str::contains("podcast_app_id = \"222\""));
}

// ─────────────────────────────────────────────────────────────────
// Invalid Configuration Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_invalid_fixture() {
    bot_cmd()
        .arg("config")
        .arg("validate")
        .arg("--config")
        .arg(invalid_config_fixture())
        .assert()
        .failure()
        .code(10)
        .stderr(predicate::str::contains("E102"));
}

#[test]
fn test_empty_config_requires_builtin_ids() {
    ConfigFixture::new("")
        .validate()
        .failure()
        .code(10)
        .stderr(predicate::str::contains("feed.music_app_id"));
}

#[test]
fn test_missing_podcast_app_id() {
    ConfigFixture::new(
        r#"
[feed]
music_app_id = "111"
"#,
    )
    .validate()
    .failure()
    .stderr(predicate::str::contains("feed.podcast_app_id"));
}

#[test]
fn test_non_http_feed_url() {
    ConfigFixture::new(
        r#"
[feed]
url = "wss://feed.example.com"
"#,
    )
    .validate()
    .failure()
    .stderr(predicate::str::contains("http"));
}

#[test]
fn test_throttle_not_below_retention() {
    ConfigFixture::new(
        r#"
[sync]
min_retention_update_interval_secs = 100
max_user_app_retention_secs = 100
"#,
    )
    .validate()
    .failure();
}

#[test]
fn test_zero_mutation_timeout() {
    ConfigFixture::new(
        r#"
[sync]
mutation_timeout_secs = 0
"#,
    )
    .validate()
    .failure()
    .stderr(predicate::str::contains("mutation_timeout_secs"));
}

#[test]
fn test_invalid_log_level() {
    ConfigFixture::new(
        r#"
[logging]
level = "loud"
"#,
    )
    .validate()
    .failure();
}

#[test]
fn test_malformed_toml() {
    ConfigFixture::new(
        r#"
[feed
url = "https://feed.example.com"
"#,
    )
    .validate()
    .failure()
    .stderr(predicate::str::contains("E101"));
}
