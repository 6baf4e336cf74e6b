//! Serializable picture of platform state
//!
//! Used as the backing data of [`InMemoryPlatform`](super::InMemoryPlatform) and as
//! the on-disk format for snapshot runs.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{Activity, CommunityId, Member, MemberId, PresenceStatus, Role, RoleId};

/// All communities visible to the bot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlatformSnapshot {
    #[serde(default)]
    pub communities: Vec<CommunitySnapshot>,
}

/// One community with its roles and members
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommunitySnapshot {
    pub id: CommunityId,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub roles: Vec<Role>,

    #[serde(default)]
    pub members: Vec<MemberSnapshot>,
}

/// One member as stored in a snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberSnapshot {
    pub id: MemberId,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub status: PresenceStatus,

    /// Held role ids
    #[serde(default)]
    pub roles: Vec<RoleId>,

    #[serde(default)]
    pub activities: Vec<Activity>,
}

impl PlatformSnapshot {
    /// Load a snapshot from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| Error::SnapshotInvalid {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        serde_json::from_str(&content).map_err(|e| Error::SnapshotInvalid {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Write the snapshot to a JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        let body = serde_json::to_string_pretty(self).map_err(|e| Error::SnapshotInvalid {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        fs::write(path, body)?;
        Ok(())
    }

    pub fn community(&self, id: CommunityId) -> Option<&CommunitySnapshot> {
        self.communities.iter().find(|c| c.id == id)
    }

    pub fn community_mut(&mut self, id: CommunityId) -> Option<&mut CommunitySnapshot> {
        self.communities.iter_mut().find(|c| c.id == id)
    }
}

impl CommunitySnapshot {
    pub fn new(id: u64) -> Self {
        Self {
            id: CommunityId(id),
            name: String::new(),
            roles: Vec::new(),
            members: Vec::new(),
        }
    }

    /// Add a role at the given hierarchy position
    pub fn with_role(mut self, id: u64, position: u32) -> Self {
        self.roles.push(Role {
            id: RoleId(id),
            name: format!("role-{}", id),
            position,
        });
        self
    }

    pub fn with_member(mut self, member: MemberSnapshot) -> Self {
        self.members.push(member);
        self
    }

    pub fn role(&self, id: RoleId) -> Option<&Role> {
        self.roles.iter().find(|r| r.id == id)
    }

    /// Resolve a stored member into a live [`Member`]; unknown role ids are dropped
    pub fn resolve(&self, member: &MemberSnapshot) -> Member {
        Member {
            id: member.id,
            community: self.id,
            status: member.status,
            activities: member.activities.clone(),
            roles: member
                .roles
                .iter()
                .filter_map(|id| self.role(*id).cloned())
                .collect(),
        }
    }
}

impl MemberSnapshot {
    pub fn new(id: u64) -> Self {
        Self {
            id: MemberId(id),
            name: String::new(),
            status: PresenceStatus::Online,
            roles: Vec::new(),
            activities: Vec::new(),
        }
    }

    pub fn with_status(mut self, status: PresenceStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_roles(mut self, roles: &[u64]) -> Self {
        self.roles = roles.iter().map(|id| RoleId(*id)).collect();
        self
    }

    pub fn with_activity(mut self, activity: Activity) -> Self {
        self.activities.push(activity);
        self
    }

    /// Shorthand for a generic activity with an application id
    pub fn playing(self, application_id: &str) -> Self {
        self.with_activity(Activity::Generic {
            application_id: Some(application_id.into()),
            name: String::new(),
        })
    }
}
