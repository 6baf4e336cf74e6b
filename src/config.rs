//! Configuration system for presence-roles
//!
//! Supports multiple configuration sources with the following precedence (highest to lowest):
//! 1. Environment variables (PRESENCE_ROLES_* prefix)
//! 2. Configuration file (TOML)
//! 3. Default values

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::apps::RetentionPolicy;
use crate::error::{Error, Result};
use crate::types::ApplicationId;

/// Main bot configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Companion application feed
    pub feed: FeedSettings,

    /// Control loop timing
    pub sync: SyncSettings,

    /// Data file paths
    pub storage: StorageSettings,

    /// Logging configuration
    pub logging: LoggingSettings,
}

/// Companion application feed settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedSettings {
    /// URL of the players document
    pub url: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Application id of the music companion app (always recognized)
    pub music_app_id: String,

    /// Application id of the podcast companion app (always recognized)
    pub podcast_app_id: String,
}

/// Control loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Seconds between two refresh-and-reconcile passes
    pub interval_secs: u64,

    /// Minimum seconds between two timestamp writes of a learned application
    pub min_retention_update_interval_secs: u64,

    /// Seconds after which an unobserved learned application is forgotten
    pub max_user_app_retention_secs: u64,

    /// Timeout for a single role grant or revoke
    pub mutation_timeout_secs: u64,

    /// Run a pass immediately instead of waiting one interval
    pub run_on_start: bool,
}

/// Storage path settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// JSON database holding mappings and application caches
    pub database: String,

    /// Platform snapshot the bot operates on
    pub snapshot: String,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level: trace, debug, info, warn, error
    pub level: String,

    /// Log file path (empty = no file logging)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    /// Number of rotated log files to keep
    pub max_files: u32,

    /// Enable JSON formatted logging
    pub json_format: bool,
}

// Default implementations

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8080/players.json".to_string(),
            timeout_secs: 30,
            music_app_id: String::new(),
            podcast_app_id: String::new(),
        }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            interval_secs: 8 * 60 * 60,
            min_retention_update_interval_secs: 24 * 60 * 60,
            max_user_app_retention_secs: 30 * 24 * 60 * 60,
            mutation_timeout_secs: 15,
            run_on_start: true,
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            database: "~/.presence-roles/database.json".to_string(),
            snapshot: "~/.presence-roles/platform.json".to_string(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            max_files: 5,
            json_format: false,
        }
    }
}

impl BotConfig {
    /// Load configuration from file with environment variable overrides
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut config = Self::default();

        // 1. Load from config file if it exists
        if let Some(path) = Self::find_config_file(config_path)? {
            debug!(path = %path.display(), "Loading configuration file");
            config = Self::from_file(&path)?;
            info!(path = %path.display(), "Configuration loaded from file");
        }

        // 2. Apply environment variable overrides
        config.apply_env_overrides();

        // 3. Expand paths
        config.expand_paths();

        // 4. Validate
        config.validate()?;

        Ok(config)
    }

    /// Parse a configuration file without overrides or validation
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            Error::config_parse(format!("Failed to read {}: {}", path.display(), e))
        })?;
        toml::from_str(&content).map_err(|e| Error::ConfigParse {
            message: format!("{}: {}", path.display(), e.message()),
            source: Some(e),
        })
    }

    /// Find the configuration file to use
    fn find_config_file(explicit_path: Option<&str>) -> Result<Option<PathBuf>> {
        // If explicit path provided, use it (error if not found)
        if let Some(path) = explicit_path {
            let path = PathBuf::from(expand_path(path));
            if path.exists() {
                return Ok(Some(path));
            }
            return Err(Error::ConfigNotFound { path });
        }

        let search_paths = [
            PathBuf::from("presence-roles.toml"),
            PathBuf::from("config.toml"),
            dirs::config_dir()
                .map(|p| p.join("presence-roles").join("config.toml"))
                .unwrap_or_default(),
            dirs::home_dir()
                .map(|p| p.join(".presence-roles").join("config.toml"))
                .unwrap_or_default(),
            PathBuf::from("/etc/presence-roles/config.toml"),
        ];

        for path in &search_paths {
            if !path.as_os_str().is_empty() && path.exists() {
                debug!(path = %path.display(), "Found configuration file");
                return Ok(Some(path.clone()));
            }
        }

        debug!("No configuration file found, using defaults");
        Ok(None)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        // Feed settings
        if let Ok(val) = std::env::var("PRESENCE_ROLES_FEED_URL") {
            self.feed.url = val;
        }
        if let Some(n) = env_parse("PRESENCE_ROLES_FEED_TIMEOUT_SECS") {
            self.feed.timeout_secs = n;
        }
        if let Ok(val) = std::env::var("PRESENCE_ROLES_MUSIC_APP_ID") {
            self.feed.music_app_id = val;
        }
        if let Ok(val) = std::env::var("PRESENCE_ROLES_PODCAST_APP_ID") {
            self.feed.podcast_app_id = val;
        }

        // Sync settings
        if let Some(n) = env_parse("PRESENCE_ROLES_SYNC_INTERVAL_SECS") {
            self.sync.interval_secs = n;
        }
        if let Some(n) = env_parse("PRESENCE_ROLES_MIN_RETENTION_UPDATE_INTERVAL_SECS") {
            self.sync.min_retention_update_interval_secs = n;
        }
        if let Some(n) = env_parse("PRESENCE_ROLES_MAX_USER_APP_RETENTION_SECS") {
            self.sync.max_user_app_retention_secs = n;
        }
        if let Some(n) = env_parse("PRESENCE_ROLES_MUTATION_TIMEOUT_SECS") {
            self.sync.mutation_timeout_secs = n;
        }
        if let Ok(val) = std::env::var("PRESENCE_ROLES_RUN_ON_START") {
            self.sync.run_on_start = env_flag(&val);
        }

        // Storage settings
        if let Ok(val) = std::env::var("PRESENCE_ROLES_DATABASE") {
            self.storage.database = val;
        }
        if let Ok(val) = std::env::var("PRESENCE_ROLES_SNAPSHOT") {
            self.storage.snapshot = val;
        }

        // Logging settings
        if let Ok(val) = std::env::var("PRESENCE_ROLES_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = std::env::var("PRESENCE_ROLES_LOG_FILE") {
            self.logging.file = Some(val);
        }
        if let Ok(val) = std::env::var("PRESENCE_ROLES_LOG_JSON") {
            self.logging.json_format = env_flag(&val);
        }
    }

    /// Expand ~ and other path variables
    fn expand_paths(&mut self) {
        self.storage.database = expand_path(&self.storage.database);
        self.storage.snapshot = expand_path(&self.storage.snapshot);

        if let Some(ref file) = self.logging.file {
            self.logging.file = Some(expand_path(file));
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let feed_url = url::Url::parse(&self.feed.url).map_err(|e| {
            Error::config_field_invalid("feed.url", format!("Invalid feed URL '{}': {}", self.feed.url, e))
        })?;
        if !matches!(feed_url.scheme(), "http" | "https") {
            return Err(Error::config_field_invalid(
                "feed.url",
                "Feed URL must start with http:// or https://",
            ));
        }

        let positive = [
            ("feed.timeout_secs", self.feed.timeout_secs),
            ("sync.interval_secs", self.sync.interval_secs),
            ("sync.min_retention_update_interval_secs", self.sync.min_retention_update_interval_secs),
            ("sync.max_user_app_retention_secs", self.sync.max_user_app_retention_secs),
            ("sync.mutation_timeout_secs", self.sync.mutation_timeout_secs),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(Error::config_field_invalid(field, format!("{} must be greater than 0", field)));
            }
        }

        if self.sync.min_retention_update_interval_secs >= self.sync.max_user_app_retention_secs {
            return Err(Error::config_field_invalid(
                "sync.min_retention_update_interval_secs",
                "min_retention_update_interval_secs must be smaller than max_user_app_retention_secs",
            ));
        }

        if self.storage.database.trim().is_empty() {
            return Err(Error::config_field_invalid(
                "storage.database",
                "Database path cannot be empty",
            ));
        }

        // Validate log level
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(Error::config_field_invalid(
                "logging.level",
                format!(
                    "Invalid log level '{}'. Must be one of: {}",
                    self.logging.level,
                    valid_levels.join(", ")
                ),
            ));
        }

        let builtin = [
            ("feed.music_app_id", &self.feed.music_app_id),
            ("feed.podcast_app_id", &self.feed.podcast_app_id),
        ];
        for (field, id) in builtin {
            if id.trim().is_empty() {
                return Err(Error::config_field_invalid(
                    field,
                    format!("{} must be set to the companion application id", field),
                ));
            }
        }

        Ok(())
    }

    /// Application ids recognized regardless of the feed
    pub fn builtin_applications(&self) -> Vec<ApplicationId> {
        [&self.feed.music_app_id, &self.feed.podcast_app_id]
            .into_iter()
            .map(|id| ApplicationId::new(id.trim()))
            .collect()
    }

    pub fn retention_policy(&self) -> RetentionPolicy {
        RetentionPolicy {
            min_update_interval: Duration::from_secs(self.sync.min_retention_update_interval_secs),
            max_retention: Duration::from_secs(self.sync.max_user_app_retention_secs),
        }
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync.interval_secs)
    }

    pub fn mutation_timeout(&self) -> Duration {
        Duration::from_secs(self.sync.mutation_timeout_secs)
    }

    pub fn feed_timeout(&self) -> Duration {
        Duration::from_secs(self.feed.timeout_secs)
    }

    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(&self.storage.database)
    }

    pub fn snapshot_path(&self) -> PathBuf {
        PathBuf::from(&self.storage.snapshot)
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok()?.trim().parse().ok()
}

fn env_flag(val: &str) -> bool {
    val.to_lowercase() == "true" || val == "1"
}

/// Expand ~ and environment variables in paths
fn expand_path(path: &str) -> String {
    shellexpand::full(path)
        .unwrap_or(std::borrow::Cow::Borrowed(path))
        .into_owned()
}

/// Initialize a new configuration file
pub fn init_config(path: Option<&str>, force: bool) -> Result<PathBuf> {
    let config_path = path
        .map(|p| PathBuf::from(expand_path(p)))
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".presence-roles")
                .join("config.toml")
        });

    if config_path.exists() && !force {
        return Err(Error::Config(format!(
            "Configuration file already exists: {}. Use --force to overwrite.",
            config_path.display()
        )));
    }

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| Error::Config(format!("Failed to create config directory: {}", e)))?;
    }

    fs::write(&config_path, generate_default_config())
        .map_err(|e| Error::Config(format!("Failed to write config file: {}", e)))?;

    info!(path = %config_path.display(), "Configuration file created");
    Ok(config_path)
}

/// Generate default configuration content with comments
fn generate_default_config() -> String {
    r#"# presence-roles configuration

[feed]
# Players document listing companion applications
url = "http://127.0.0.1:8080/players.json"

# Request timeout in seconds
timeout_secs = 30

# Companion app ids that are always recognized (required)
music_app_id = ""
podcast_app_id = ""

[sync]
# Seconds between refresh-and-reconcile passes (8 hours)
interval_secs = 28800

# Minimum seconds between timestamp writes of a learned application (1 day)
min_retention_update_interval_secs = 86400

# Forget learned applications not seen for this long (30 days)
max_user_app_retention_secs = 2592000

# Timeout for a single role grant or revoke
mutation_timeout_secs = 15

# Run a pass right away instead of waiting one interval
run_on_start = true

[storage]
# Database with role mappings and application caches
database = "~/.presence-roles/database.json"

# Platform snapshot file
snapshot = "~/.presence-roles/platform.json"

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log file path (comment out to disable file logging)
# file = "~/.presence-roles/logs/presence-roles.log"

# Number of rotated log files to keep
max_files = 5

# Enable JSON formatted logging
json_format = false
"#
    .to_string()
}
