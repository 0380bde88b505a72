//! Host permission registry - in-process mirror target
//!
//! Stores what the engine mirrors: group permission sets keyed by rank name
//! and, per player, group memberships plus own permissions. Host code that
//! cannot call into the engine checks permissions here.

use std::collections::HashSet;

use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use super::{NativeSync, SyncError};
use crate::permissions::matcher;

/// Mirrored state for one player
#[derive(Debug, Clone, Default)]
pub struct HostUser {
    /// Lowercased group names
    pub groups: HashSet<String>,
    /// Permissions granted to the player directly
    pub permissions: HashSet<String>,
}

/// Concurrent host-side permission registry
#[derive(Debug, Default)]
pub struct HostRegistry {
    groups: DashMap<String, HashSet<String>>,
    users: DashMap<Uuid, HostUser>,
}

impl HostRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Query APIs
    // ========================================================================

    /// Check a permission against the player's own grants and their groups
    pub fn has_permission(&self, player_id: Uuid, permission: &str) -> bool {
        let Some(user) = self.users.get(&player_id) else {
            return false;
        };

        matcher::matches(&user.permissions, permission)
            || user.groups.iter().any(|group| {
                self.groups
                    .get(group)
                    .map(|perms| matcher::matches(&perms, permission))
                    .unwrap_or(false)
            })
    }

    /// Permission set mirrored for a group
    pub fn group_permissions(&self, group: &str) -> Option<HashSet<String>> {
        self.groups
            .get(&group.to_lowercase())
            .map(|perms| perms.clone())
    }

    /// Groups a player belongs to
    pub fn user_groups(&self, player_id: Uuid) -> HashSet<String> {
        self.users
            .get(&player_id)
            .map(|user| user.groups.clone())
            .unwrap_or_default()
    }

    /// Permissions granted to the player directly
    pub fn user_permissions(&self, player_id: Uuid) -> HashSet<String> {
        self.users
            .get(&player_id)
            .map(|user| user.permissions.clone())
            .unwrap_or_default()
    }

    /// Check if the player has any mirrored state
    pub fn is_registered(&self, player_id: Uuid) -> bool {
        self.users.contains_key(&player_id)
    }

    /// Number of players with mirrored state
    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// Drop everything
    pub fn clear_all(&self) {
        self.groups.clear();
        self.users.clear();
    }
}

#[async_trait]
impl NativeSync for HostRegistry {
    async fn set_group_permissions(
        &self,
        group: &str,
        permissions: &HashSet<String>,
    ) -> Result<(), SyncError> {
        self.groups.insert(group.to_lowercase(), permissions.clone());
        Ok(())
    }

    async fn add_user_to_group(&self, player_id: Uuid, group: &str) -> Result<(), SyncError> {
        self.users
            .entry(player_id)
            .or_default()
            .groups
            .insert(group.to_lowercase());
        Ok(())
    }

    async fn remove_user_from_group(
        &self,
        player_id: Uuid,
        group: &str,
    ) -> Result<(), SyncError> {
        if let Some(mut user) = self.users.get_mut(&player_id) {
            user.groups.remove(&group.to_lowercase());
        }
        Ok(())
    }

    async fn set_user_permissions(
        &self,
        player_id: Uuid,
        permissions: &HashSet<String>,
    ) -> Result<(), SyncError> {
        self.users.entry(player_id).or_default().permissions = permissions.clone();
        Ok(())
    }

    async fn add_user_permissions(
        &self,
        player_id: Uuid,
        permissions: &HashSet<String>,
    ) -> Result<(), SyncError> {
        self.users
            .entry(player_id)
            .or_default()
            .permissions
            .extend(permissions.iter().cloned());
        Ok(())
    }

    async fn remove_user_permissions(
        &self,
        player_id: Uuid,
        permissions: &HashSet<String>,
    ) -> Result<(), SyncError> {
        if let Some(mut user) = self.users.get_mut(&player_id) {
            user.permissions.retain(|perm| !permissions.contains(perm));
        }
        Ok(())
    }

    async fn clear_user_permissions(&self, player_id: Uuid) -> Result<(), SyncError> {
        self.users.remove(&player_id);
        Ok(())
    }
}
