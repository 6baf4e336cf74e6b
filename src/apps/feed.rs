//! Companion application feed
//!
//! The feed is a JSON document listing media players supported by the companion
//! app. Players that have a rich-presence application publish its id under
//! `extra.discord_application_id`, either as a string or as a number.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::types::ApplicationId;
use crate::version;

// ─────────────────────────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────────────────────────

/// Top-level feed document
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedDocument {
    #[serde(default)]
    pub players: Vec<FeedPlayer>,
}

/// One player entry
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedPlayer {
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub extra: Option<PlayerExtra>,
}

/// Platform-specific annotations of a player
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlayerExtra {
    #[serde(default)]
    pub discord_application_id: Option<Value>,
}

impl FeedPlayer {
    /// Application id, if the entry exposes a usable one
    pub fn application_id(&self) -> Option<ApplicationId> {
        match self.extra.as_ref()?.discord_application_id.as_ref()? {
            Value::String(s) if !s.trim().is_empty() => Some(ApplicationId::new(s.as_str())),
            Value::Number(n) => Some(ApplicationId::new(n.to_string())),
            _ => None,
        }
    }

    /// Name used in diagnostics
    pub fn label(&self) -> &str {
        self.name
            .as_deref()
            .or(self.id.as_deref())
            .unwrap_or("<unnamed>")
    }
}

impl FeedDocument {
    /// Every application id in the feed, skipping entries without one
    pub fn application_ids(&self) -> Vec<ApplicationId> {
        self.players
            .iter()
            .filter_map(|player| {
                let id = player.application_id();
                if id.is_none() {
                    debug!(player = %player.label(), "Player has no application id");
                }
                id
            })
            .collect()
    }
}

// ─────────────────────────────────────────────────────────────────
// Feed Source
// ─────────────────────────────────────────────────────────────────

/// Source of the companion application feed
#[async_trait]
pub trait ApplicationFeed: Send + Sync {
    /// Where the feed comes from, for logging
    fn source(&self) -> &str;

    /// Fetch and decode the current feed
    async fn fetch(&self) -> Result<FeedDocument>;
}

/// Feed fetched with a single HTTP GET
pub struct HttpFeed {
    url: String,
    client: reqwest::Client,
}

impl HttpFeed {
    /// Create a feed client; every request is bounded by `timeout`
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(version::build_info().user_agent())
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

#[async_trait]
impl ApplicationFeed for HttpFeed {
    fn source(&self) -> &str {
        &self.url
    }

    async fn fetch(&self) -> Result<FeedDocument> {
        debug!(url = %self.url, "Fetching application feed");

        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| Error::FeedUnreachable {
                url: self.url.clone(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::FeedStatus {
                url: self.url.clone(),
                status: status.as_u16(),
            });
        }

        let document = response
            .json::<FeedDocument>()
            .await
            .map_err(|e| Error::FeedMalformed {
                url: self.url.clone(),
                message: e.to_string(),
            })?;

        info!(url = %self.url, players = document.players.len(), "Application feed fetched");
        Ok(document)
    }
}

/// Fixed feed for tests; `None` behaves like an unreachable feed
#[cfg(test)]
pub struct StaticFeed {
    document: parking_lot::Mutex<Option<FeedDocument>>,
}

#[cfg(test)]
impl StaticFeed {
    pub fn with_ids(ids: &[&str]) -> Self {
        let players = ids
            .iter()
            .map(|id| FeedPlayer {
                id: None,
                name: Some(format!("player-{}", id)),
                extra: Some(PlayerExtra {
                    discord_application_id: Some(Value::String(id.to_string())),
                }),
            })
            .collect();
        Self {
            document: parking_lot::Mutex::new(Some(FeedDocument { players })),
        }
    }

    pub fn unreachable() -> Self {
        Self {
            document: parking_lot::Mutex::new(None),
        }
    }

    pub fn set_ids(&self, ids: &[&str]) {
        *self.document.lock() = Self::with_ids(ids).document.into_inner();
    }
}

#[cfg(test)]
#[async_trait]
impl ApplicationFeed for StaticFeed {
    fn source(&self) -> &str {
        "static"
    }

    async fn fetch(&self) -> Result<FeedDocument> {
        self.document.lock().clone().ok_or_else(|| Error::FeedUnreachable {
            url: "static".to_string(),
            message: "connection refused".to_string(),
        })
    }
}
