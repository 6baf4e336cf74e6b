//! Chat-platform boundary
//!
//! The reconciler only sees the platform through [`ChatPlatform`]. Connection,
//! gateway events and caching belong to the client behind it; the in-memory
//! implementation backs tests and snapshot-driven runs.

pub mod memory;
pub mod snapshot;

pub use memory::{InMemoryPlatform, MutationKind, RoleMutation};
pub use snapshot::{CommunitySnapshot, MemberSnapshot, PlatformSnapshot};

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{CommunityId, Member, MemberId, Role, RoleId};

/// Operations consumed from the chat-platform client
///
/// Grant and revoke are idempotent: granting a held role or revoking a missing
/// one is a no-op. Both may fail transiently (permissions, rate limits).
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Communities the bot is part of
    async fn communities(&self) -> Result<Vec<CommunityId>>;

    /// Live state of every member of a community
    async fn members(&self, community: CommunityId) -> Result<Vec<Member>>;

    /// Live state of one member
    async fn member(&self, community: CommunityId, member: MemberId) -> Result<Member>;

    /// Resolve a role id; `None` if the role was deleted
    async fn role(&self, community: CommunityId, role: RoleId) -> Result<Option<Role>>;

    /// Add a role to a member
    async fn grant_role(&self, community: CommunityId, member: MemberId, role: RoleId) -> Result<()>;

    /// Remove a role from a member
    async fn revoke_role(&self, community: CommunityId, member: MemberId, role: RoleId) -> Result<()>;
}
