//! Error types for presence-roles
//!
//! Provides structured error handling with:
//! - Numeric error codes for machine parsing
//! - Fatal/transient classification used by the reconciliation loop
//! - User-friendly messages with suggestions
//! - Exit codes for CLI

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for bot operations
pub type Result<T> = std::result::Result<T, Error>;

/// Numeric error codes for machine parsing and documentation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    // Configuration errors (1xx)
    ConfigNotFound = 100,
    ConfigParseError = 101,
    ConfigValidation = 102,

    // Store errors (2xx)
    StoreRead = 200,
    StoreWrite = 201,
    StoreCorrupt = 202,

    // Feed errors (3xx)
    FeedUnreachable = 300,
    FeedStatus = 301,
    FeedMalformed = 302,

    // Platform errors (4xx)
    PlatformMutation = 400,
    PlatformTimeout = 401,
    UnknownCommunity = 402,
    UnknownMember = 403,
    UnknownRole = 404,
    SnapshotInvalid = 405,

    // Internal errors (9xx)
    InternalError = 900,
}

impl ErrorCode {
    /// Get the string code (e.g., "E100")
    pub fn as_str(&self) -> String {
        format!("E{}", *self as u16)
    }

    /// Get the exit code for CLI
    pub fn exit_code(&self) -> i32 {
        match *self as u16 {
            100..=199 => 10,
            200..=299 => 20,
            300..=399 => 30,
            400..=499 => 40,
            900..=999 => 90,
            _ => 1,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Main error type
#[derive(Error, Debug)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Configuration parse error
    #[error("Failed to parse configuration: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<toml::de::Error>,
    },

    /// Configuration validation error
    #[error("Configuration validation failed: {message}")]
    ConfigValidation { message: String, field: Option<String> },

    /// Generic configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    Toml(#[from] toml::ser::Error),

    // ─────────────────────────────────────────────────────────────
    // Store Errors
    // ─────────────────────────────────────────────────────────────

    /// Store file could not be read
    #[error("Failed to read store {path}")]
    StoreRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Store file could not be written
    #[error("Failed to write store {path}")]
    StoreWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Stored value does not have the expected shape
    #[error("Corrupt value at {key}: {message}")]
    StoreCorrupt { key: String, message: String },

    // ─────────────────────────────────────────────────────────────
    // Feed Errors
    // ─────────────────────────────────────────────────────────────

    /// Feed could not be reached (DNS, connect, timeout)
    #[error("Failed to fetch application feed from {url}: {message}")]
    FeedUnreachable { url: String, message: String },

    /// Feed answered with a non-success status
    #[error("Application feed {url} returned HTTP {status}")]
    FeedStatus { url: String, status: u16 },

    /// Feed body could not be decoded
    #[error("Application feed {url} is malformed: {message}")]
    FeedMalformed { url: String, message: String },

    // ─────────────────────────────────────────────────────────────
    // Platform Errors
    // ─────────────────────────────────────────────────────────────

    /// Role grant or revoke was rejected by the platform
    #[error("Failed to {action} role {role} on member {member}: {message}")]
    PlatformMutation {
        action: &'static str,
        member: u64,
        role: u64,
        message: String,
    },

    /// Role grant or revoke did not complete in time
    #[error("Timed out after {timeout_secs}s trying to {action} role {role} on member {member}")]
    PlatformTimeout {
        action: &'static str,
        member: u64,
        role: u64,
        timeout_secs: u64,
    },

    /// Community is not known to the platform
    #[error("Unknown community: {0}")]
    UnknownCommunity(u64),

    /// Member is not part of the community
    #[error("Unknown member {member} in community {community}")]
    UnknownMember { community: u64, member: u64 },

    /// Role does not exist in the community
    #[error("Unknown role {role} in community {community}")]
    UnknownRole { community: u64, role: u64 },

    /// Platform snapshot file is unreadable or invalid
    #[error("Invalid platform snapshot {path}: {message}")]
    SnapshotInvalid { path: PathBuf, message: String },

    // ─────────────────────────────────────────────────────────────
    // Internal Errors
    // ─────────────────────────────────────────────────────────────

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    // ─────────────────────────────────────────────────────────────
    // Error Classification
    // ─────────────────────────────────────────────────────────────

    /// Get the numeric error code
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::ConfigNotFound { .. } => ErrorCode::ConfigNotFound,
            Error::ConfigParse { .. } => ErrorCode::ConfigParseError,
            Error::ConfigValidation { .. } => ErrorCode::ConfigValidation,
            Error::Config(_) => ErrorCode::ConfigValidation,
            Error::Toml(_) => ErrorCode::ConfigParseError,

            Error::StoreRead { .. } => ErrorCode::StoreRead,
            Error::StoreWrite { .. } => ErrorCode::StoreWrite,
            Error::StoreCorrupt { .. } => ErrorCode::StoreCorrupt,

            Error::FeedUnreachable { .. } => ErrorCode::FeedUnreachable,
            Error::FeedStatus { .. } => ErrorCode::FeedStatus,
            Error::FeedMalformed { .. } => ErrorCode::FeedMalformed,

            Error::PlatformMutation { .. } => ErrorCode::PlatformMutation,
            Error::PlatformTimeout { .. } => ErrorCode::PlatformTimeout,
            Error::UnknownCommunity(_) => ErrorCode::UnknownCommunity,
            Error::UnknownMember { .. } => ErrorCode::UnknownMember,
            Error::UnknownRole { .. } => ErrorCode::UnknownRole,
            Error::SnapshotInvalid { .. } => ErrorCode::SnapshotInvalid,

            Error::Io(_) => ErrorCode::StoreWrite,
            Error::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Check if the error is transient (the next tick may succeed)
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::FeedUnreachable { .. }
                | Error::FeedStatus { .. }
                | Error::FeedMalformed { .. }
                | Error::PlatformMutation { .. }
                | Error::PlatformTimeout { .. }
        )
    }

    /// Check if the error is fatal (the control loop must stop)
    ///
    /// Store failures leave no state that can be assumed consistent.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::ConfigNotFound { .. }
                | Error::ConfigParse { .. }
                | Error::ConfigValidation { .. }
                | Error::Config(_)
                | Error::StoreRead { .. }
                | Error::StoreWrite { .. }
                | Error::StoreCorrupt { .. }
                | Error::Io(_)
                | Error::Internal(_)
        )
    }

    /// Get the exit code for CLI
    pub fn exit_code(&self) -> i32 {
        self.code().exit_code()
    }

    // ─────────────────────────────────────────────────────────────
    // User-Friendly Messages
    // ─────────────────────────────────────────────────────────────

    /// Get a user-friendly suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Error::ConfigNotFound { .. } => Some(
                "Run 'presence-roles config init' to create a default configuration file.",
            ),
            Error::ConfigParse { .. } => Some(
                "Check your configuration file syntax. Run 'presence-roles config validate' to see details.",
            ),
            Error::ConfigValidation { .. } => Some(
                "Review the configuration file and fix the invalid values.",
            ),
            Error::StoreRead { .. } | Error::StoreWrite { .. } => Some(
                "Check that the database path in [storage] exists and is writable.",
            ),
            Error::StoreCorrupt { .. } => Some(
                "The database file was modified by hand or by an incompatible version. Restore it from a backup.",
            ),
            Error::FeedUnreachable { .. } | Error::FeedStatus { .. } => Some(
                "Check your network connection and the [feed] url. The previous application list stays in use.",
            ),
            Error::PlatformMutation { .. } => Some(
                "Make sure the bot role is placed above every listener role and has the Manage Roles permission.",
            ),
            Error::SnapshotInvalid { .. } => Some(
                "Check the platform snapshot file referenced by [storage] snapshot.",
            ),
            _ => None,
        }
    }

    /// Format the error for terminal display with colors
    pub fn format_for_terminal(&self) -> String {
        let mut output = format!("\x1b[31mError [{}]\x1b[0m: {}\n", self.code().as_str(), self);

        if let Some(hint) = self.suggestion() {
            output.push_str(&format!("\n\x1b[33mHint\x1b[0m: {}\n", hint));
        }

        output
    }

    /// Format the error for logging (no colors)
    pub fn format_for_log(&self) -> String {
        format!("[{}] {}", self.code().as_str(), self)
    }
}

// ─────────────────────────────────────────────────────────────────
// Error Constructors
// ─────────────────────────────────────────────────────────────────

impl Error {
    /// Create a config parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Error::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create a config validation error with field name
    pub fn config_field_invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ConfigValidation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a corrupt store value error
    pub fn store_corrupt(key: impl Into<String>, message: impl fmt::Display) -> Self {
        Error::StoreCorrupt {
            key: key.into(),
            message: message.to_string(),
        }
    }

    /// Create a role mutation error
    pub fn mutation_failed(
        action: &'static str,
        member: u64,
        role: u64,
        message: impl Into<String>,
    ) -> Self {
        Error::PlatformMutation {
            action,
            member,
            role,
            message: message.into(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_format() {
        assert_eq!(ErrorCode::ConfigNotFound.as_str(), "E100");
        assert_eq!(ErrorCode::FeedUnreachable.as_str(), "E300");
        assert_eq!(ErrorCode::InternalError.as_str(), "E900");
    }

    #[test]
    fn test_error_exit_codes() {
        assert_eq!(ErrorCode::ConfigValidation.exit_code(), 10);
        assert_eq!(ErrorCode::StoreWrite.exit_code(), 20);
        assert_eq!(ErrorCode::FeedStatus.exit_code(), 30);
        assert_eq!(ErrorCode::PlatformMutation.exit_code(), 40);
        assert_eq!(ErrorCode::InternalError.exit_code(), 90);
    }

    #[test]
    fn test_feed_errors_are_transient() {
        let err = Error::FeedStatus {
            url: "https://example.com/players.json".into(),
            status: 503,
        };
        assert!(err.is_retryable());
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("503"));
    }

    #[test]
    fn test_store_errors_are_fatal() {
        let err = Error::store_corrupt("roles/1", "expected object");
        assert!(err.is_fatal());
        assert!(!err.is_retryable());
        assert_eq!(err.code(), ErrorCode::StoreCorrupt);
    }

    #[test]
    fn test_mutation_error_is_neither_fatal_nor_silent() {
        let err = Error::mutation_failed("grant", 7, 42, "Missing Permissions");
        assert!(!err.is_fatal());
        assert!(err.is_retryable());
        let msg = err.to_string();
        assert!(msg.contains("grant"));
        assert!(msg.contains("42"));
        assert!(msg.contains("Missing Permissions"));
    }

    #[test]
    fn test_format_for_terminal() {
        let err = Error::ConfigNotFound {
            path: PathBuf::from("/test/config.toml"),
        };
        let formatted = err.format_for_terminal();

        assert!(formatted.contains("E100"));
        assert!(formatted.contains("\x1b[31m"));
        assert!(formatted.contains("Hint"));
        assert!(formatted.contains("config init"));
    }

    #[test]
    fn test_format_for_log() {
        let err = Error::UnknownCommunity(99);
        let formatted = err.format_for_log();

        assert!(formatted.contains("[E402]"));
        assert!(!formatted.contains("\x1b["));
    }
}
