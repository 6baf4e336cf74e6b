//! CLI integration tests
//!
//! Tests the command-line interface using assert_cmd

mod common;

use common::{bot_cmd, serve_feed_once, Workspace};
use predicates::prelude::*;

// ─────────────────────────────────────────────────────────────────
// Help and Version Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_help_flag() {
    bot_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("refresh"))
        .stdout(predicate::str::contains("check"))
        .stdout(predicate::str::contains("roles"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_version_command() {
    bot_cmd()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("presence-roles"))
        .stdout(predicate::str::contains("Git Branch"))
        .stdout(predicate::str::contains("Target"));
}

#[test]
fn test_verbosity_flags() {
    bot_cmd().arg("-vv").arg("version").assert().success();
    bot_cmd().arg("--quiet").arg("version").assert().success();
}

// ─────────────────────────────────────────────────────────────────
// Config Command Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_config_show() {
    let ws = Workspace::new();
    ws.cmd()
        .arg("config")
        .arg("show")
        .assert()
        .success()
        .stdout(predicate::str::contains("[feed]"))
        .stdout(predicate::str::contains("[sync]"))
        .stdout(predicate::str::contains("[storage]"))
        .stdout(predicate::str::contains("music_app_id = \"111\""));
}

#[test]
fn test_config_validate_nonexistent_file() {
    bot_cmd()
        .arg("config")
        .arg("validate")
        .arg("--config")
        .arg("/nonexistent/path/config.toml")
        .assert()
        .failure()
        .code(10)
        .stderr(predicate::str::contains("E100"));
}

#[test]
fn test_config_init_writes_template() {
    let ws = Workspace::new();
    let path = ws.dir.path().join("fresh").join("config.toml");

    bot_cmd()
        .arg("config")
        .arg("init")
        .arg("--path")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration file created"));

    // The template leaves the companion application ids to the operator
    bot_cmd()
        .arg("config")
        .arg("validate")
        .arg("--config")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("feed.music_app_id"));

    bot_cmd()
        .env("PRESENCE_ROLES_MUSIC_APP_ID", "111")
        .env("PRESENCE_ROLES_PODCAST_APP_ID", "222")
        .arg("config")
        .arg("validate")
        .arg("--config")
        .arg(&path)
        .assert()
        .success();

    // Refuses to overwrite without --force
    bot_cmd()
        .arg("config")
        .arg("init")
        .arg("--path")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

// ─────────────────────────────────────────────────────────────────
// Role Mapping Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_roles_show_empty() {
    let ws = Workspace::new();
    ws.cmd()
        .args(["roles", "show", "--community", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No listener roles are configured"));
}

#[test]
fn test_roles_map_and_show() {
    let ws = Workspace::new();
    ws.cmd()
        .args(["roles", "map", "--community", "1", "--role", "10", "--listener", "100"])
        .assert()
        .success();
    ws.cmd()
        .args(["roles", "map", "--community", "1", "--role", "11", "--listener", "100"])
        .assert()
        .success();

    ws.cmd()
        .args(["roles", "show", "--community", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("- <@&100> is assigned to <@&10> and <@&11>"));

    assert_eq!(ws.database()["roles"]["1"]["10"], 100);
}

#[test]
fn test_roles_map_unknown_role() {
    let ws = Workspace::new();
    ws.cmd()
        .args(["roles", "map", "--community", "1", "--role", "10", "--listener", "999"])
        .assert()
        .failure()
        .code(40)
        .stderr(predicate::str::contains("Unknown role 999"));
}

#[test]
fn test_roles_unmap_strips_listener() {
    let ws = Workspace::new();
    ws.cmd()
        .args(["roles", "map", "--community", "1", "--role", "10", "--listener", "100"])
        .assert()
        .success();

    // Member 2 holds both the target and the listener role
    assert!(ws.held_roles(1, 2).contains(&100));

    ws.cmd()
        .args(["roles", "unmap", "--community", "1", "--role", "10"])
        .assert()
        .success()
        .stdout(predicate::str::contains("no longer grants 100"));

    assert_eq!(ws.held_roles(1, 2), vec![10]);
}

// ─────────────────────────────────────────────────────────────────
// Reconciliation Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_check_community_grants_and_revokes() {
    let ws = Workspace::new();
    ws.cmd()
        .args(["roles", "map", "--community", "1", "--role", "10", "--listener", "100"])
        .assert()
        .success();

    ws.cmd()
        .args(["check", "--community", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 granted, 1 revoked, 0 failed"));

    // Online and playing the built-in app
    assert!(ws.held_roles(1, 1).contains(&100));
    // Offline members lose the listener role
    assert!(!ws.held_roles(1, 2).contains(&100));

    // Second pass changes nothing
    ws.cmd()
        .args(["check"])
        .assert()
        .success()
        .stdout(predicate::str::contains("0 granted, 0 revoked"));
}

#[test]
fn test_check_single_member() {
    let ws = Workspace::new();
    ws.cmd()
        .args(["roles", "map", "--community", "1", "--role", "10", "--listener", "100"])
        .assert()
        .success();

    ws.cmd()
        .args(["check", "--community", "1", "--member", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("granted listener role 100"));
}

#[test]
fn test_check_unknown_member() {
    let ws = Workspace::new();
    ws.cmd()
        .args(["check", "--community", "1", "--member", "42"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown member 42"));
}

#[test]
fn test_learn_then_grant() {
    let ws = Workspace::new();
    ws.cmd()
        .args(["roles", "map", "--community", "1", "--role", "11", "--listener", "101"])
        .assert()
        .success();

    ws.cmd()
        .args(["learn", "--community", "1", "--member", "3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Application 555: Learned"))
        .stdout(predicate::str::contains("granted listener role 101"));

    assert!(ws.held_roles(1, 3).contains(&101));
    assert!(ws.database()["user_apps"]["3"]["555"]["timestamp"].is_i64());
}

#[test]
fn test_refresh_from_feed() {
    let url = serve_feed_once(
        r#"{"players": [
            {"name": "A", "extra": {"discord_application_id": "555"}},
            {"name": "B", "extra": {"discord_application_id": 777}},
            {"name": "C"}
        ]}"#,
    );
    let ws = Workspace::with_feed(&url);

    ws.cmd()
        .arg("refresh")
        .assert()
        .success()
        .stdout(predicate::str::contains("Updated application ids (4 entries)"));

    let apps = ws.database()["apps"].clone();
    assert_eq!(apps, serde_json::json!(["111", "222", "555", "777"]));
}

#[test]
fn test_refresh_unreachable_feed() {
    let ws = Workspace::new();
    ws.cmd()
        .arg("refresh")
        .assert()
        .failure()
        .code(30)
        .stderr(predicate::str::contains("E300"));
}
