//! In-memory chat platform
//!
//! Holds a [`PlatformSnapshot`] behind a lock and applies grants/revokes to it.
//! Every mutation call is recorded so callers can verify exactly which requests
//! the reconciler issued, and individual members can be configured to reject
//! mutations or to never answer them, to exercise failure paths.

use std::collections::HashSet;
use std::path::Path;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::{Error, Result};
use crate::types::{Activity, CommunityId, Member, MemberId, PresenceStatus, Role, RoleId};

use super::snapshot::{CommunitySnapshot, PlatformSnapshot};
use super::ChatPlatform;

/// Kind of role mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Grant,
    Revoke,
}

/// A recorded grant/revoke request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleMutation {
    pub kind: MutationKind,
    pub community: CommunityId,
    pub member: MemberId,
    pub role: RoleId,
}

/// [`ChatPlatform`] over an in-memory snapshot
pub struct InMemoryPlatform {
    state: RwLock<PlatformSnapshot>,
    failing_members: RwLock<HashSet<MemberId>>,
    stalled_members: RwLock<HashSet<MemberId>>,
    mutations: RwLock<Vec<RoleMutation>>,
}

impl InMemoryPlatform {
    pub fn new(snapshot: PlatformSnapshot) -> Self {
        Self {
            state: RwLock::new(snapshot),
            failing_members: RwLock::new(HashSet::new()),
            stalled_members: RwLock::new(HashSet::new()),
            mutations: RwLock::new(Vec::new()),
        }
    }

    /// Build a platform with a single community
    pub fn with_community(community: CommunitySnapshot) -> Self {
        Self::new(PlatformSnapshot {
            communities: vec![community],
        })
    }

    /// Load the platform state from a snapshot file
    pub fn load(path: &Path) -> Result<Self> {
        Ok(Self::new(PlatformSnapshot::load(path)?))
    }

    /// Write the current state back to a snapshot file
    pub fn save(&self, path: &Path) -> Result<()> {
        self.state.read().save(path)
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> PlatformSnapshot {
        self.state.read().clone()
    }

    // ─────────────────────────────────────────────────────────────
    // Mutation Tracking
    // ─────────────────────────────────────────────────────────────

    /// All grant/revoke requests received so far
    pub fn mutations(&self) -> Vec<RoleMutation> {
        self.mutations.read().clone()
    }

    /// Number of requests of the given kind
    pub fn mutation_count(&self, kind: MutationKind) -> usize {
        self.mutations.read().iter().filter(|m| m.kind == kind).count()
    }

    pub fn clear_mutations(&self) {
        self.mutations.write().clear();
    }

    /// Make every grant/revoke on this member fail
    pub fn fail_mutations_for(&self, member: MemberId) {
        self.failing_members.write().insert(member);
    }

    /// Make every grant/revoke on this member hang without completing
    pub fn stall_mutations_for(&self, member: MemberId) {
        self.stalled_members.write().insert(member);
    }

    async fn stall_if_requested(&self, member: MemberId) {
        let stalled = self.stalled_members.read().contains(&member);
        if stalled {
            std::future::pending::<()>().await;
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Direct State Edits (external changes)
    // ─────────────────────────────────────────────────────────────

    /// Delete a role from a community, as an administrator would
    pub fn delete_role(&self, community: CommunityId, role: RoleId) {
        let mut state = self.state.write();
        if let Some(c) = state.community_mut(community) {
            c.roles.retain(|r| r.id != role);
            for m in &mut c.members {
                m.roles.retain(|r| *r != role);
            }
        }
    }

    /// Replace a member's activities
    pub fn set_activities(&self, community: CommunityId, member: MemberId, activities: Vec<Activity>) {
        self.edit_member(community, member, |m| m.activities = activities);
    }

    /// Change a member's presence status
    pub fn set_status(&self, community: CommunityId, member: MemberId, status: PresenceStatus) {
        self.edit_member(community, member, |m| m.status = status);
    }

    /// Give a member a role without recording a mutation
    pub fn assign_role(&self, community: CommunityId, member: MemberId, role: RoleId) {
        self.edit_member(community, member, |m| {
            if !m.roles.contains(&role) {
                m.roles.push(role);
            }
        });
    }

    /// Role ids currently held by a member
    pub fn held_roles(&self, community: CommunityId, member: MemberId) -> Vec<RoleId> {
        self.state
            .read()
            .community(community)
            .and_then(|c| c.members.iter().find(|m| m.id == member))
            .map(|m| m.roles.clone())
            .unwrap_or_default()
    }

    fn edit_member(
        &self,
        community: CommunityId,
        member: MemberId,
        f: impl FnOnce(&mut super::MemberSnapshot),
    ) {
        let mut state = self.state.write();
        if let Some(m) = state
            .community_mut(community)
            .and_then(|c| c.members.iter_mut().find(|m| m.id == member))
        {
            f(m);
        }
    }

    /// Record and apply a mutation
    fn mutate(
        &self,
        kind: MutationKind,
        community: CommunityId,
        member: MemberId,
        role: RoleId,
    ) -> Result<()> {
        self.mutations.write().push(RoleMutation {
            kind,
            community,
            member,
            role,
        });

        let action = match kind {
            MutationKind::Grant => "grant",
            MutationKind::Revoke => "revoke",
        };

        if self.failing_members.read().contains(&member) {
            return Err(Error::mutation_failed(
                action,
                member.get(),
                role.get(),
                "Missing Permissions",
            ));
        }

        let mut state = self.state.write();
        let c = state
            .community_mut(community)
            .ok_or(Error::UnknownCommunity(community.get()))?;
        if c.role(role).is_none() {
            return Err(Error::UnknownRole {
                community: community.get(),
                role: role.get(),
            });
        }
        let m = c
            .members
            .iter_mut()
            .find(|m| m.id == member)
            .ok_or(Error::UnknownMember {
                community: community.get(),
                member: member.get(),
            })?;

        match kind {
            MutationKind::Grant => {
                if !m.roles.contains(&role) {
                    m.roles.push(role);
                }
            }
            MutationKind::Revoke => m.roles.retain(|r| *r != role),
        }
        Ok(())
    }
}

#[async_trait]
impl ChatPlatform for InMemoryPlatform {
    async fn communities(&self) -> Result<Vec<CommunityId>> {
        Ok(self.state.read().communities.iter().map(|c| c.id).collect())
    }

    async fn members(&self, community: CommunityId) -> Result<Vec<Member>> {
        let state = self.state.read();
        let c = state
            .community(community)
            .ok_or(Error::UnknownCommunity(community.get()))?;
        Ok(c.members.iter().map(|m| c.resolve(m)).collect())
    }

    async fn member(&self, community: CommunityId, member: MemberId) -> Result<Member> {
        let state = self.state.read();
        let c = state
            .community(community)
            .ok_or(Error::UnknownCommunity(community.get()))?;
        c.members
            .iter()
            .find(|m| m.id == member)
            .map(|m| c.resolve(m))
            .ok_or(Error::UnknownMember {
                community: community.get(),
                member: member.get(),
            })
    }

    async fn role(&self, community: CommunityId, role: RoleId) -> Result<Option<Role>> {
        let state = self.state.read();
        let c = state
            .community(community)
            .ok_or(Error::UnknownCommunity(community.get()))?;
        Ok(c.role(role).cloned())
    }

    async fn grant_role(&self, community: CommunityId, member: MemberId, role: RoleId) -> Result<()> {
        self.stall_if_requested(member).await;
        self.mutate(MutationKind::Grant, community, member, role)
    }

    async fn revoke_role(&self, community: CommunityId, member: MemberId, role: RoleId) -> Result<()> {
        self.stall_if_requested(member).await;
        self.mutate(MutationKind::Revoke, community, member, role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::MemberSnapshot;

    fn platform() -> InMemoryPlatform {
        InMemoryPlatform::with_community(
            CommunitySnapshot::new(1)
                .with_role(10, 1)
                .with_role(20, 2)
                .with_member(MemberSnapshot::new(5).with_roles(&[10])),
        )
    }

    #[tokio::test]
    async fn test_grant_and_revoke_are_idempotent() {
        let platform = platform();
        let (c, m) = (CommunityId(1), MemberId(5));

        platform.grant_role(c, m, RoleId(20)).await.unwrap();
        platform.grant_role(c, m, RoleId(20)).await.unwrap();
        assert_eq!(platform.held_roles(c, m), vec![RoleId(10), RoleId(20)]);

        platform.revoke_role(c, m, RoleId(20)).await.unwrap();
        platform.revoke_role(c, m, RoleId(20)).await.unwrap();
        assert_eq!(platform.held_roles(c, m), vec![RoleId(10)]);

        assert_eq!(platform.mutation_count(MutationKind::Grant), 2);
        assert_eq!(platform.mutation_count(MutationKind::Revoke), 2);
    }

    #[tokio::test]
    async fn test_failing_member_rejects_mutations() {
        let platform = platform();
        platform.fail_mutations_for(MemberId(5));

        let err = platform
            .grant_role(CommunityId(1), MemberId(5), RoleId(20))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PlatformMutation { .. }));
        assert_eq!(platform.held_roles(CommunityId(1), MemberId(5)), vec![RoleId(10)]);
    }

    #[tokio::test]
    async fn test_deleted_role_no_longer_resolves() {
        let platform = platform();
        platform.delete_role(CommunityId(1), RoleId(10));

        assert!(platform.role(CommunityId(1), RoleId(10)).await.unwrap().is_none());
        let member = platform.member(CommunityId(1), MemberId(5)).await.unwrap();
        assert!(member.roles.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_community() {
        let platform = platform();
        assert!(matches!(
            platform.members(CommunityId(2)).await,
            Err(Error::UnknownCommunity(2))
        ));
    }
}
