//! Core domain types shared by the store, platform and reconciler
//!
//! Identifiers are platform snowflakes. They serialize as plain numbers (or, for
//! map keys, as numeric strings) so the persisted layout stays readable.

use std::fmt;

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────
// Identifiers
// ─────────────────────────────────────────────────────────────────

macro_rules! snowflake {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// Get the raw snowflake
            pub fn get(self) -> u64 {
                self.0
            }

            /// Key used for this id in the store
            pub fn key(self) -> String {
                self.0.to_string()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }
    };
}

snowflake!(
    /// A chat community (guild)
    CommunityId
);
snowflake!(
    /// A role inside a community
    RoleId
);
snowflake!(
    /// A community member (user)
    MemberId
);

/// Rich-presence application identifier
///
/// Kept as a string: the feed publishes ids both as JSON strings and numbers,
/// and the store keys them by their decimal text.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplicationId(String);

impl ApplicationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<u64> for ApplicationId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for ApplicationId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

// ─────────────────────────────────────────────────────────────────
// Roles and Members
// ─────────────────────────────────────────────────────────────────

/// A live role resolved from the platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,

    #[serde(default)]
    pub name: String,

    /// Hierarchy position; higher is more senior
    #[serde(default)]
    pub position: u32,
}

/// Member presence status as reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Idle,
    #[serde(alias = "dnd")]
    DoNotDisturb,
    Invisible,
    #[default]
    Offline,
}

impl PresenceStatus {
    /// Whether the member appears offline to the bot
    ///
    /// Activities of such members cannot be verified.
    pub fn hides_activity(self) -> bool {
        matches!(self, PresenceStatus::Invisible | PresenceStatus::Offline)
    }
}

/// One rich-presence activity of a member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Activity {
    /// The platform's own music integration; never counts as a companion app
    NativeIntegration,

    /// An application-backed activity
    Generic {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        application_id: Option<ApplicationId>,
        #[serde(default)]
        name: String,
    },

    /// Custom status text
    Custom {
        #[serde(default)]
        text: String,
    },
}

impl Activity {
    /// Application id of a generic activity, if any
    pub fn application_id(&self) -> Option<&ApplicationId> {
        match self {
            Activity::Generic { application_id, .. } => application_id.as_ref(),
            _ => None,
        }
    }
}

/// Snapshot of one member's live state
#[derive(Debug, Clone)]
pub struct Member {
    pub id: MemberId,
    pub community: CommunityId,
    pub status: PresenceStatus,
    pub activities: Vec<Activity>,

    /// Roles currently held, in no particular order
    pub roles: Vec<Role>,
}

impl Member {
    pub fn has_role(&self, role: RoleId) -> bool {
        self.roles.iter().any(|r| r.id == role)
    }

    /// Held roles from most senior to least senior
    ///
    /// Seniority is the role's position, highest first. Roles with equal
    /// position are ordered by id, highest id first.
    pub fn roles_by_seniority(&self) -> Vec<&Role> {
        let mut roles: Vec<&Role> = self.roles.iter().collect();
        roles.sort_by(|a, b| b.position.cmp(&a.position).then(b.id.cmp(&a.id)));
        roles
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn role(id: u64, position: u32) -> Role {
        Role {
            id: RoleId(id),
            name: format!("role-{}", id),
            position,
        }
    }

    #[test]
    fn test_roles_by_seniority() {
        let member = Member {
            id: MemberId(1),
            community: CommunityId(1),
            status: PresenceStatus::Online,
            activities: vec![],
            roles: vec![role(10, 1), role(11, 5), role(12, 3), role(13, 3)],
        };

        let order: Vec<u64> = member.roles_by_seniority().iter().map(|r| r.id.get()).collect();
        assert_eq!(order, vec![11, 13, 12, 10]);
    }

    #[test]
    fn test_hides_activity() {
        assert!(PresenceStatus::Offline.hides_activity());
        assert!(PresenceStatus::Invisible.hides_activity());
        assert!(!PresenceStatus::Online.hides_activity());
        assert!(!PresenceStatus::DoNotDisturb.hides_activity());
    }

    #[test]
    fn test_activity_json_shape() {
        let json = r#"[
            {"type": "native_integration"},
            {"type": "generic", "application_id": "1234", "name": "Music Presence"},
            {"type": "custom", "text": "hi"}
        ]"#;
        let parsed: Vec<Activity> = serde_json::from_str(json).unwrap();

        assert_eq!(parsed[0], Activity::NativeIntegration);
        assert_eq!(parsed[1].application_id(), Some(&ApplicationId::from("1234")));
        assert_eq!(parsed[2].application_id(), None);
    }

    #[test]
    fn test_snowflake_map_keys() {
        let mut map = std::collections::BTreeMap::new();
        map.insert(RoleId(5), RoleId(9));
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"5":9}"#);

        let back: std::collections::BTreeMap<RoleId, RoleId> = serde_json::from_str(&json).unwrap();
        assert_eq!(back.get(&RoleId(5)), Some(&RoleId(9)));
    }
}
