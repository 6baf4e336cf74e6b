//! Common test utilities and fixtures
//!
//! Each CLI test runs against its own temporary workspace: a config file whose
//! database and snapshot paths point into a temp dir, and a copy of the
//! platform snapshot fixture.

#![allow(dead_code)]

use std::fs;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::thread;

use assert_cmd::Command;
use serde_json::Value;
use tempfile::TempDir;

/// Get the path to the test fixtures directory
pub fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
}

/// Get a path to a specific fixture file
pub fn fixture_path(name: &str) -> PathBuf {
    fixtures_dir().join(name)
}

pub fn valid_config_fixture() -> PathBuf {
    fixture_path("valid_config.toml")
}

pub fn invalid_config_fixture() -> PathBuf {
    fixture_path("invalid_config.toml")
}

/// Command for the presence-roles binary, isolated from the caller's environment
pub fn bot_cmd() -> Command {
    let mut cmd = Command::cargo_bin("presence-roles").unwrap();
    cmd.env_remove("PRESENCE_ROLES_CONFIG").env_remove("RUST_LOG");
    cmd
}

/// Temporary config, database and platform snapshot
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self::with_feed("http://127.0.0.1:9/players.json")
    }

    pub fn with_feed(feed_url: &str) -> Self {
        let dir = TempDir::new().unwrap();
        fs::copy(fixture_path("snapshot.json"), dir.path().join("platform.json")).unwrap();

        let config = format!(
            r#"
[feed]
url = "{feed_url}"
timeout_secs = 5
music_app_id = "111"
podcast_app_id = "222"

[sync]
mutation_timeout_secs = 5

[storage]
database = '{database}'
snapshot = '{snapshot}'

[logging]
level = "warn"
"#,
            feed_url = feed_url,
            database = dir.path().join("database.json").display(),
            snapshot = dir.path().join("platform.json").display(),
        );
        fs::write(dir.path().join("config.toml"), config).unwrap();

        Self { dir }
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.path().join("config.toml")
    }

    pub fn database_path(&self) -> PathBuf {
        self.dir.path().join("database.json")
    }

    /// Command with `--config` pointing at this workspace
    pub fn cmd(&self) -> Command {
        let mut cmd = bot_cmd();
        cmd.arg("--config").arg(self.config_path());
        cmd
    }

    /// Role ids a member holds according to the saved snapshot
    pub fn held_roles(&self, community: u64, member: u64) -> Vec<u64> {
        let snapshot = read_json(&self.dir.path().join("platform.json"));
        snapshot["communities"]
            .as_array()
            .unwrap()
            .iter()
            .find(|c| c["id"] == community)
            .and_then(|c| {
                c["members"]
                    .as_array()
                    .unwrap()
                    .iter()
                    .find(|m| m["id"] == member)
                    .cloned()
            })
            .map(|m| {
                m["roles"]
                    .as_array()
                    .unwrap()
                    .iter()
                    .map(|r| r.as_u64().unwrap())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn database(&self) -> Value {
        read_json(&self.database_path())
    }
}

fn read_json(path: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

/// Serve one HTTP 200 response with `body` on a loopback port
pub fn serve_feed_once(body: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    thread::spawn(move || {
        if let Ok((mut stream, _)) = listener.accept() {
            let mut buf = [0u8; 4096];
            let _ = stream.read(&mut buf);
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            let _ = stream.write_all(response.as_bytes());
        }
    });

    format!("http://{}/players.json", addr)
}
