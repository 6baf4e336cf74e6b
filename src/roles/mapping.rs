//! Target-role → listener-role mapping table
//!
//! One table per community, stored in the `roles` namespace. A target role maps
//! to at most one listener role; several target roles may share a listener.
//!
//! # Read-repair
//!
//! [`RoleMappings::listener_for`] and [`RoleMappings::all_listeners`] are not pure
//! queries: when they find an entry that references a role which no longer exists
//! in the live community, they delete that entry from the store before returning.
//! Callers see the entry as absent.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::Result;
use crate::platform::ChatPlatform;
use crate::store::{KeyValueStore, ROLES_NAMESPACE};
use crate::types::{CommunityId, Role, RoleId};

use super::overview;

/// Mapping of target role → listener role for one community
pub type MappingTable = BTreeMap<RoleId, RoleId>;

/// Store-backed access to role mappings
#[derive(Clone)]
pub struct RoleMappings {
    store: Arc<dyn KeyValueStore>,
}

impl RoleMappings {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// The community's table; empty if nothing is mapped
    pub fn mappings(&self, community: CommunityId) -> Result<MappingTable> {
        Ok(self
            .store
            .dget_as::<MappingTable>(ROLES_NAMESPACE, &community.key())?
            .unwrap_or_default())
    }

    /// Whether the community has at least one mapping
    pub fn has_mappings(&self, community: CommunityId) -> Result<bool> {
        Ok(!self.mappings(community)?.is_empty())
    }

    // ─────────────────────────────────────────────────────────────
    // Administration
    // ─────────────────────────────────────────────────────────────

    /// Map `for_role` to `listener`, returning the listener it replaced
    pub fn set_mapping(
        &self,
        community: CommunityId,
        for_role: RoleId,
        listener: RoleId,
    ) -> Result<Option<RoleId>> {
        let mut previous = None;
        self.store
            .dupdate_as::<MappingTable, _>(ROLES_NAMESPACE, &community.key(), |table| {
                let mut table = table.unwrap_or_default();
                previous = table.insert(for_role, listener);
                Some(table)
            })?;

        info!(
            community = %community,
            role = %for_role,
            listener = %listener,
            "Role mapping set"
        );
        Ok(previous)
    }

    /// Remove the mapping of `for_role`, returning its listener
    pub fn remove_mapping(&self, community: CommunityId, for_role: RoleId) -> Result<Option<RoleId>> {
        let mut removed = None;
        self.store
            .dupdate_as::<MappingTable, _>(ROLES_NAMESPACE, &community.key(), |table| {
                let mut table = table?;
                removed = table.remove(&for_role);
                (!table.is_empty()).then_some(table)
            })?;

        if let Some(listener) = removed {
            info!(community = %community, role = %for_role, listener = %listener, "Role mapping removed");
        }
        Ok(removed)
    }

    /// Drop every mapping of the community, returning how many there were
    pub fn clear(&self, community: CommunityId) -> Result<usize> {
        let count = self.mappings(community)?.len();
        self.store.dremove(ROLES_NAMESPACE, &community.key())?;
        info!(community = %community, count, "Role mappings cleared");
        Ok(count)
    }

    // ─────────────────────────────────────────────────────────────
    // Resolution (with read-repair)
    // ─────────────────────────────────────────────────────────────

    /// Resolve the listener role mapped from `role`
    ///
    /// Returns `None` if `role` is unmapped. If it is mapped to a listener role that
    /// no longer exists, the mapping is deleted and `None` is returned.
    pub async fn listener_for(
        &self,
        platform: &dyn ChatPlatform,
        community: CommunityId,
        role: RoleId,
    ) -> Result<Option<Role>> {
        let Some(listener_id) = self.mappings(community)?.get(&role).copied() else {
            return Ok(None);
        };

        match platform.role(community, listener_id).await? {
            Some(listener) => Ok(Some(listener)),
            None => {
                self.prune(community, &[(role, listener_id)])?;
                Ok(None)
            }
        }
    }

    /// Resolve every listener role mapped in the community
    ///
    /// Entries whose listener role no longer exists are deleted. A deleted target
    /// role keeps its entry, so the listener it granted can still be revoked.
    /// The result is deduplicated and keeps first-seen order.
    pub async fn all_listeners(
        &self,
        platform: &dyn ChatPlatform,
        community: CommunityId,
    ) -> Result<Vec<Role>> {
        let table = self.mappings(community)?;
        let mut listeners: Vec<Role> = Vec::new();
        let mut dangling = Vec::new();

        for (for_role, listener_id) in table {
            match platform.role(community, listener_id).await? {
                Some(listener) => {
                    if !listeners.iter().any(|l| l.id == listener.id) {
                        listeners.push(listener);
                    }
                }
                None => dangling.push((for_role, listener_id)),
            }
        }

        if !dangling.is_empty() {
            self.prune(community, &dangling)?;
        }
        Ok(listeners)
    }

    /// Render the mapping table for display
    pub fn overview(&self, community: CommunityId) -> Result<Option<String>> {
        Ok(overview::render(&self.mappings(community)?))
    }

    /// Delete dangling entries, but only if they still point where we saw them
    fn prune(&self, community: CommunityId, entries: &[(RoleId, RoleId)]) -> Result<()> {
        self.store
            .dupdate_as::<MappingTable, _>(ROLES_NAMESPACE, &community.key(), |table| {
                let mut table = table?;
                for (for_role, listener) in entries {
                    if table.get(for_role) == Some(listener) {
                        table.remove(for_role);
                    }
                }
                (!table.is_empty()).then_some(table)
            })?;

        for (for_role, listener) in entries {
            debug!(
                community = %community,
                role = %for_role,
                listener = %listener,
                "Pruned mapping referencing a deleted role"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{CommunitySnapshot, InMemoryPlatform};
    use crate::store::JsonFileStore;

    const C: CommunityId = CommunityId(1);

    fn setup() -> (RoleMappings, InMemoryPlatform) {
        let store: Arc<dyn KeyValueStore> = Arc::new(JsonFileStore::in_memory());
        let platform = InMemoryPlatform::with_community(
            CommunitySnapshot::new(1)
                .with_role(10, 5)
                .with_role(11, 4)
                .with_role(100, 1)
                .with_role(101, 1),
        );
        (RoleMappings::new(store), platform)
    }

    #[tokio::test]
    async fn test_unmapped_role_has_no_listener() {
        let (mappings, platform) = setup();
        assert!(mappings.listener_for(&platform, C, RoleId(10)).await.unwrap().is_none());
        assert!(!mappings.has_mappings(C).unwrap());
    }

    #[tokio::test]
    async fn test_listener_for_resolves_live_role() {
        let (mappings, platform) = setup();
        mappings.set_mapping(C, RoleId(10), RoleId(100)).unwrap();

        let listener = mappings.listener_for(&platform, C, RoleId(10)).await.unwrap();
        assert_eq!(listener.map(|r| r.id), Some(RoleId(100)));
    }

    #[tokio::test]
    async fn test_listener_for_prunes_deleted_listener() {
        let (mappings, platform) = setup();
        mappings.set_mapping(C, RoleId(10), RoleId(100)).unwrap();
        mappings.set_mapping(C, RoleId(11), RoleId(101)).unwrap();
        platform.delete_role(C, RoleId(100));

        assert!(mappings.listener_for(&platform, C, RoleId(10)).await.unwrap().is_none());

        let table = mappings.mappings(C).unwrap();
        assert!(!table.contains_key(&RoleId(10)));
        assert_eq!(table.get(&RoleId(11)), Some(&RoleId(101)));
    }

    #[tokio::test]
    async fn test_all_listeners_dedups_many_to_one() {
        let (mappings, platform) = setup();
        mappings.set_mapping(C, RoleId(10), RoleId(100)).unwrap();
        mappings.set_mapping(C, RoleId(11), RoleId(100)).unwrap();

        let listeners = mappings.all_listeners(&platform, C).await.unwrap();
        assert_eq!(listeners.len(), 1);
        assert_eq!(listeners[0].id, RoleId(100));
    }

    #[tokio::test]
    async fn test_all_listeners_prunes_only_deleted_listeners() {
        let (mappings, platform) = setup();
        mappings.set_mapping(C, RoleId(10), RoleId(100)).unwrap();
        mappings.set_mapping(C, RoleId(11), RoleId(101)).unwrap();

        // A deleted target keeps its entry
        platform.delete_role(C, RoleId(11));
        let listeners = mappings.all_listeners(&platform, C).await.unwrap();
        assert_eq!(
            listeners.iter().map(|r| r.id).collect::<Vec<_>>(),
            vec![RoleId(100), RoleId(101)]
        );
        assert_eq!(mappings.mappings(C).unwrap().len(), 2);

        platform.delete_role(C, RoleId(100));
        let listeners = mappings.all_listeners(&platform, C).await.unwrap();
        assert_eq!(listeners.iter().map(|r| r.id).collect::<Vec<_>>(), vec![RoleId(101)]);
        assert!(!mappings.mappings(C).unwrap().contains_key(&RoleId(10)));

        platform.delete_role(C, RoleId(101));
        assert!(mappings.all_listeners(&platform, C).await.unwrap().is_empty());
        assert!(!mappings.has_mappings(C).unwrap());
    }

    #[test]
    fn test_set_and_remove_mapping() {
        let (mappings, _) = setup();
        assert_eq!(mappings.set_mapping(C, RoleId(10), RoleId(100)).unwrap(), None);
        assert_eq!(
            mappings.set_mapping(C, RoleId(10), RoleId(101)).unwrap(),
            Some(RoleId(100))
        );

        assert_eq!(mappings.remove_mapping(C, RoleId(10)).unwrap(), Some(RoleId(101)));
        assert_eq!(mappings.remove_mapping(C, RoleId(10)).unwrap(), None);
        assert!(!mappings.has_mappings(C).unwrap());
    }

    #[test]
    fn test_clear() {
        let (mappings, _) = setup();
        mappings.set_mapping(C, RoleId(10), RoleId(100)).unwrap();
        mappings.set_mapping(C, RoleId(11), RoleId(100)).unwrap();

        assert_eq!(mappings.clear(C).unwrap(), 2);
        assert!(mappings.mappings(C).unwrap().is_empty());
        assert!(mappings.overview(C).unwrap().is_none());
    }
}
