//! Recognized application registry and per-member learned cache
//!
//! `KnownApplications` is replaced wholesale on every successful feed refresh.
//! The learned cache keeps application ids observed on individual members that
//! the feed does not (yet) list; entries expire after the retention horizon and
//! are dropped once the id becomes globally known.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::clock::Clock;
use crate::error::Result;
use crate::store::{KeyValueStore, APPS_KEY, USER_APPS_NAMESPACE};
use crate::types::{ApplicationId, MemberId};

use super::feed::ApplicationFeed;

/// Set of globally recognized application ids
pub type KnownApplications = BTreeSet<ApplicationId>;

/// One member's learned application ids
pub type UserAppCache = BTreeMap<ApplicationId, UserApp>;

/// Learned application entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserApp {
    /// Unix seconds of the last recorded observation
    pub timestamp: i64,
}

/// Timing rules for the learned cache
#[derive(Debug, Clone, Copy)]
pub struct RetentionPolicy {
    /// Minimum time between two timestamp writes for the same entry
    pub min_update_interval: Duration,

    /// Entries not observed for longer than this are removed
    pub max_retention: Duration,
}

impl RetentionPolicy {
    fn min_update_secs(&self) -> i64 {
        self.min_update_interval.as_secs() as i64
    }

    fn max_retention_secs(&self) -> i64 {
        self.max_retention.as_secs() as i64
    }

    /// Whether an entry stamped at `timestamp` may be rewritten at `now`
    pub fn update_due(&self, timestamp: i64, now: i64) -> bool {
        now - timestamp >= self.min_update_secs()
    }

    /// Whether an entry stamped at `timestamp` has expired at `now`
    pub fn expired(&self, timestamp: i64, now: i64) -> bool {
        now - timestamp > self.max_retention_secs()
    }
}

/// Result of a cache prune
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PruneReport {
    /// Entries dropped because the id is now globally known
    pub promoted: usize,

    /// Entries dropped because they outlived the retention horizon
    pub expired: usize,

    /// Members whose cache became empty and was removed
    pub members_removed: usize,
}

/// Result of [`AppRegistry::learn`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LearnOutcome {
    /// Id is globally known; nothing recorded
    AlreadyKnown,
    /// New entry created
    Learned,
    /// Existing entry's timestamp refreshed
    Refreshed,
    /// Existing entry left alone (throttled)
    Unchanged,
}

/// Store-backed application registry
#[derive(Clone)]
pub struct AppRegistry {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    builtin: Vec<ApplicationId>,
    policy: RetentionPolicy,
}

impl AppRegistry {
    /// Create a registry; `builtin` ids are always recognized
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        builtin: Vec<ApplicationId>,
        policy: RetentionPolicy,
    ) -> Self {
        Self {
            store,
            clock,
            builtin,
            policy,
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Known Applications
    // ─────────────────────────────────────────────────────────────

    /// The recognized set; only the built-in ids before the first refresh
    pub fn known_applications(&self) -> Result<KnownApplications> {
        Ok(self
            .store
            .get_as::<KnownApplications>(APPS_KEY)?
            .unwrap_or_else(|| self.builtin.iter().cloned().collect()))
    }

    /// Membership test against the recognized set
    pub fn is_known(&self, app_id: &ApplicationId) -> Result<bool> {
        Ok(self.known_applications()?.contains(app_id))
    }

    /// Refresh the recognized set from the feed
    ///
    /// On any fetch failure the stored set is left untouched, the cache is not
    /// pruned and the error is returned. On success the new set replaces the old
    /// one in a single write and the learned cache is pruned.
    pub async fn refresh(&self, feed: &dyn ApplicationFeed) -> Result<usize> {
        let document = feed.fetch().await?;

        let mut known: KnownApplications = self.builtin.iter().cloned().collect();
        known.extend(document.application_ids());

        self.store.set_as(APPS_KEY, &known)?;
        info!(
            source = %feed.source(),
            entries = known.len(),
            "Updated application ids"
        );

        self.prune_user_cache()?;
        Ok(known.len())
    }

    // ─────────────────────────────────────────────────────────────
    // Learned Cache
    // ─────────────────────────────────────────────────────────────

    /// A member's learned cache; empty if none
    pub fn user_apps(&self, member: MemberId) -> Result<UserAppCache> {
        Ok(self
            .store
            .dget_as::<UserAppCache>(USER_APPS_NAMESPACE, &member.key())?
            .unwrap_or_default())
    }

    /// Record that `member` was observed running `app_id`
    pub fn learn(&self, member: MemberId, app_id: &ApplicationId) -> Result<LearnOutcome> {
        if self.is_known(app_id)? {
            return Ok(LearnOutcome::AlreadyKnown);
        }

        let now = self.clock.unix_now();
        let policy = self.policy;
        let mut outcome = LearnOutcome::Unchanged;

        self.store
            .dupdate_as::<UserAppCache, _>(USER_APPS_NAMESPACE, &member.key(), |cache| {
                let mut cache = cache.unwrap_or_default();
                outcome = match cache.entry(app_id.clone()) {
                    Entry::Vacant(slot) => {
                        slot.insert(UserApp { timestamp: now });
                        LearnOutcome::Learned
                    }
                    Entry::Occupied(mut slot) if policy.update_due(slot.get().timestamp, now) => {
                        slot.get_mut().timestamp = now;
                        LearnOutcome::Refreshed
                    }
                    Entry::Occupied(_) => LearnOutcome::Unchanged,
                };
                Some(cache)
            })?;

        info!(member = %member, app_id = %app_id, outcome = ?outcome, "Learned application id");
        Ok(outcome)
    }

    /// Refresh the timestamp of a learned entry, at most once per throttle window
    ///
    /// Returns whether a write happened. Missing entries are left alone.
    pub fn touch(&self, member: MemberId, app_id: &ApplicationId) -> Result<bool> {
        let now = self.clock.unix_now();
        let policy = self.policy;

        // Cheap read first so throttled observations never hit the disk
        let due = self
            .user_apps(member)?
            .get(app_id)
            .is_some_and(|entry| policy.update_due(entry.timestamp, now));
        if !due {
            return Ok(false);
        }

        let mut written = false;
        self.store
            .dupdate_as::<UserAppCache, _>(USER_APPS_NAMESPACE, &member.key(), |cache| {
                let mut cache = cache?;
                if let Some(entry) = cache.get_mut(app_id) {
                    if policy.update_due(entry.timestamp, now) {
                        entry.timestamp = now;
                        written = true;
                    }
                }
                Some(cache)
            })?;

        if written {
            debug!(member = %member, app_id = %app_id, "Refreshed learned application timestamp");
        }
        Ok(written)
    }

    /// Drop promoted and expired entries from every member's cache
    ///
    /// Members whose cache ends up empty are removed; members with remaining
    /// entries are never removed. Safe to run repeatedly.
    pub fn prune_user_cache(&self) -> Result<PruneReport> {
        let known = self.known_applications()?;
        let now = self.clock.unix_now();
        let policy = self.policy;
        let mut report = PruneReport::default();

        self.store
            .update_as::<BTreeMap<String, UserAppCache>, _>(USER_APPS_NAMESPACE, |all| {
                let all = all?;
                let mut sanitized = BTreeMap::new();

                for (member, cache) in all {
                    let mut kept = UserAppCache::new();
                    for (app_id, entry) in cache {
                        if known.contains(&app_id) {
                            debug!(member = %member, app_id = %app_id, "Deleted known user app id");
                            report.promoted += 1;
                        } else if policy.expired(entry.timestamp, now) {
                            debug!(member = %member, app_id = %app_id, "Deleted expired user app id");
                            report.expired += 1;
                        } else {
                            kept.insert(app_id, entry);
                        }
                    }

                    if kept.is_empty() {
                        report.members_removed += 1;
                    } else {
                        sanitized.insert(member, kept);
                    }
                }

                Some(sanitized)
            })?;

        if report != PruneReport::default() {
            info!(
                promoted = report.promoted,
                expired = report.expired,
                members_removed = report.members_removed,
                "Pruned learned application cache"
            );
        }
        Ok(report)
    }
}
