//! Presence reconciler
//!
//! Decides per member whether they are currently listening and brings their
//! listener roles in line with that decision. Nothing about a member is kept
//! between passes except the learned application cache; every pass starts from
//! the live state the platform reports.
//!
//! # Decision
//!
//! A member is listening when their status does not hide activity and one of
//! their generic activities carries an application id that is either globally
//! known or in their learned cache. A listening member gets the listener role of
//! their most senior mapped role and nothing else; a member who is not listening
//! loses every listener role they hold.
//!
//! Mutations run one at a time and each is bounded by a timeout. A failed
//! mutation is not retried in the same pass.

pub mod report;

pub use report::{MemberOutcome, PassReport};

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::apps::{AppRegistry, KnownApplications, LearnOutcome};
use crate::error::{Error, Result};
use crate::platform::{ChatPlatform, MutationKind};
use crate::roles::RoleMappings;
use crate::types::{Activity, ApplicationId, CommunityId, Member, MemberId, Role, RoleId};

/// Reconciles listener roles against live presence
pub struct Reconciler {
    platform: Arc<dyn ChatPlatform>,
    mappings: RoleMappings,
    registry: AppRegistry,
    mutation_timeout: Duration,
}

impl Reconciler {
    pub fn new(
        platform: Arc<dyn ChatPlatform>,
        mappings: RoleMappings,
        registry: AppRegistry,
        mutation_timeout: Duration,
    ) -> Self {
        Self {
            platform,
            mappings,
            registry,
            mutation_timeout,
        }
    }

    pub fn mappings(&self) -> &RoleMappings {
        &self.mappings
    }

    pub fn registry(&self) -> &AppRegistry {
        &self.registry
    }

    pub fn platform(&self) -> &dyn ChatPlatform {
        self.platform.as_ref()
    }

    // ─────────────────────────────────────────────────────────────
    // Reconciliation
    // ─────────────────────────────────────────────────────────────

    /// Reconcile one member from their live state
    ///
    /// Mutation failures are returned to the caller.
    pub async fn reconcile_member(
        &self,
        community: CommunityId,
        member: MemberId,
    ) -> Result<MemberOutcome> {
        let member = self.platform.member(community, member).await?;
        let known = self.registry.known_applications()?;
        self.apply(&member, &known).await
    }

    /// Reconcile every member of a community
    ///
    /// Communities without mappings are skipped entirely. Failures of single
    /// members are logged and counted; fatal errors abort the pass.
    pub async fn reconcile_community(&self, community: CommunityId) -> Result<PassReport> {
        let mut report = PassReport::default();

        if !self.mappings.has_mappings(community)? {
            debug!(community = %community, "No role mappings, skipping community");
            return Ok(report);
        }

        let known = self.registry.known_applications()?;
        let members = self.platform.members(community).await?;
        report.communities = 1;

        for member in &members {
            match self.apply(member, &known).await {
                Ok(outcome) => report.record(&outcome),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(
                        community = %community,
                        member = %member.id,
                        error = %e.format_for_log(),
                        "Failed to reconcile member"
                    );
                    report.record_failure();
                }
            }
        }

        info!(
            community = %community,
            members = report.members,
            granted = report.granted,
            revoked = report.revoked,
            failed = report.failed,
            "Community reconciled"
        );
        Ok(report)
    }

    /// Reconcile every community the platform reports
    pub async fn reconcile_all_communities(&self) -> Result<PassReport> {
        let mut report = PassReport::default();

        for community in self.platform.communities().await? {
            match self.reconcile_community(community).await {
                Ok(partial) => report.merge(partial),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(
                        community = %community,
                        error = %e.format_for_log(),
                        "Failed to reconcile community"
                    );
                }
            }
        }

        Ok(report)
    }

    /// Application id that makes the member count as listening
    ///
    /// Learned entries that match get their timestamp refreshed, throttled.
    pub fn listening_app(
        &self,
        member: &Member,
        known: &KnownApplications,
    ) -> Result<Option<ApplicationId>> {
        if member.status.hides_activity() {
            return Ok(None);
        }

        let learned = self.registry.user_apps(member.id)?;

        for app_id in member.activities.iter().filter_map(Activity::application_id) {
            if known.contains(app_id) {
                return Ok(Some(app_id.clone()));
            }
            if learned.contains_key(app_id) {
                self.registry.touch(member.id, app_id)?;
                return Ok(Some(app_id.clone()));
            }
        }

        Ok(None)
    }

    async fn apply(&self, member: &Member, known: &KnownApplications) -> Result<MemberOutcome> {
        match self.listening_app(member, known)? {
            Some(app_id) => self.apply_listening(member, &app_id).await,
            None => self.apply_not_listening(member).await,
        }
    }

    async fn apply_listening(&self, member: &Member, app_id: &ApplicationId) -> Result<MemberOutcome> {
        let community = member.community;

        for role in member.roles_by_seniority() {
            let Some(listener) = self
                .mappings
                .listener_for(self.platform.as_ref(), community, role.id)
                .await?
            else {
                continue;
            };

            if member.has_role(listener.id) {
                return Ok(MemberOutcome::Retained(listener.id));
            }

            self.mutate(MutationKind::Grant, community, member.id, listener.id)
                .await?;
            info!(
                community = %community,
                member = %member.id,
                role = %role.id,
                listener = %listener.id,
                app_id = %app_id,
                "Granted listener role"
            );
            return Ok(MemberOutcome::Granted(listener.id));
        }

        debug!(community = %community, member = %member.id, "Listening member holds no mapped role");
        Ok(MemberOutcome::Skipped)
    }

    async fn apply_not_listening(&self, member: &Member) -> Result<MemberOutcome> {
        let community = member.community;
        let listeners = self
            .mappings
            .all_listeners(self.platform.as_ref(), community)
            .await?;

        let mut revoked = Vec::new();
        for listener in listeners.iter().filter(|l| member.has_role(l.id)) {
            self.mutate(MutationKind::Revoke, community, member.id, listener.id)
                .await?;
            info!(
                community = %community,
                member = %member.id,
                listener = %listener.id,
                "Revoked listener role"
            );
            revoked.push(listener.id);
        }

        if revoked.is_empty() {
            Ok(MemberOutcome::Unchanged)
        } else {
            Ok(MemberOutcome::Revoked(revoked))
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Administration
    // ─────────────────────────────────────────────────────────────

    /// Revoke the listener of `target` from every member holding both
    ///
    /// Returns the listener role, or `None` if `target` has no live mapping.
    pub async fn strip_listener_from_all(
        &self,
        community: CommunityId,
        target: RoleId,
    ) -> Result<Option<Role>> {
        let Some(listener) = self
            .mappings
            .listener_for(self.platform.as_ref(), community, target)
            .await?
        else {
            return Ok(None);
        };

        let report = self.strip(community, Some(target), &[listener.id]).await?;
        info!(
            community = %community,
            role = %target,
            listener = %listener.id,
            revoked = report.revoked,
            failed = report.failed,
            "Stripped listener role"
        );
        Ok(Some(listener))
    }

    /// Revoke every mapped listener from every member holding it
    ///
    /// Holding the target role is not required. Returns the listener roles involved.
    pub async fn strip_all_listeners(&self, community: CommunityId) -> Result<Vec<Role>> {
        let listeners = self
            .mappings
            .all_listeners(self.platform.as_ref(), community)
            .await?;
        let ids: Vec<RoleId> = listeners.iter().map(|l| l.id).collect();

        let report = self.strip(community, None, &ids).await?;
        info!(
            community = %community,
            listeners = listeners.len(),
            revoked = report.revoked,
            failed = report.failed,
            "Stripped all listener roles"
        );
        Ok(listeners)
    }

    /// Strip the listener of `target` from its holders, then delete the mapping
    pub async fn unmap_role(&self, community: CommunityId, target: RoleId) -> Result<Option<RoleId>> {
        self.strip_listener_from_all(community, target).await?;
        self.mappings.remove_mapping(community, target)
    }

    /// Strip every listener role, then drop all of the community's mappings
    pub async fn clear_mappings(&self, community: CommunityId) -> Result<usize> {
        self.strip_all_listeners(community).await?;
        self.mappings.clear(community)
    }

    /// Learn the member's current application, then reconcile them
    ///
    /// The first generic activity with an application id is recorded in the
    /// member's learned cache (a no-op for known ids). Members whose status hides
    /// activity have nothing to learn.
    pub async fn learn_from_activity(
        &self,
        community: CommunityId,
        member: MemberId,
    ) -> Result<(Option<(ApplicationId, LearnOutcome)>, MemberOutcome)> {
        let live = self.platform.member(community, member).await?;

        let learned = if live.status.hides_activity() {
            None
        } else {
            match live.activities.iter().find_map(Activity::application_id) {
                Some(app_id) => {
                    let outcome = self.registry.learn(member, app_id)?;
                    Some((app_id.clone(), outcome))
                }
                None => None,
            }
        };

        let known = self.registry.known_applications()?;
        let outcome = self.apply(&live, &known).await?;
        Ok((learned, outcome))
    }

    /// Revoke `listeners` from every member holding them
    ///
    /// With a `target`, only members that also hold the target role are touched.
    async fn strip(
        &self,
        community: CommunityId,
        target: Option<RoleId>,
        listeners: &[RoleId],
    ) -> Result<PassReport> {
        let mut report = PassReport::default();

        for member in self.platform.members(community).await? {
            if target.is_some_and(|t| !member.has_role(t)) {
                continue;
            }
            let mut revoked: Vec<RoleId> = Vec::new();
            let mut failed = false;

            for listener in listeners {
                if revoked.contains(listener) || !member.has_role(*listener) {
                    continue;
                }
                match self
                    .mutate(MutationKind::Revoke, community, member.id, *listener)
                    .await
                {
                    Ok(()) => revoked.push(*listener),
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        warn!(
                            community = %community,
                            member = %member.id,
                            listener = %listener,
                            error = %e.format_for_log(),
                            "Failed to strip listener role"
                        );
                        failed = true;
                    }
                }
            }

            if failed {
                report.record_failure();
            } else {
                report.record(&MemberOutcome::Revoked(revoked));
            }
        }

        Ok(report)
    }

    // ─────────────────────────────────────────────────────────────
    // Platform Mutations
    // ─────────────────────────────────────────────────────────────

    async fn mutate(
        &self,
        kind: MutationKind,
        community: CommunityId,
        member: MemberId,
        role: RoleId,
    ) -> Result<()> {
        let (action, call) = match kind {
            MutationKind::Grant => ("grant", self.platform.grant_role(community, member, role)),
            MutationKind::Revoke => ("revoke", self.platform.revoke_role(community, member, role)),
        };

        tokio::time::timeout(self.mutation_timeout, call)
            .await
            .map_err(|_| Error::PlatformTimeout {
                action,
                member: member.get(),
                role: role.get(),
                timeout_secs: self.mutation_timeout.as_secs(),
            })?
    }
}
