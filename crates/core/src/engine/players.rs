//! Player mutations and lifecycle
//!
//! Each mutation persists, then drops the player's cache entry before
//! returning, so the player's next check sees the change.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::PermissionEngine;
use crate::error::EngineResult;
use crate::permissions::PlayerPermissionSet;

impl PermissionEngine {
    /// Assign a rank to a player, optionally until `expires_at`
    #[tracing::instrument(skip(self))]
    pub async fn add_player_rank(
        &self,
        player_id: Uuid,
        rank_name: &str,
        expires_at: Option<DateTime<Utc>>,
        assigned_by: Option<Uuid>,
    ) -> EngineResult<()> {
        let Some(rank) = self.ranks.get_by_name(rank_name) else {
            return Ok(());
        };

        self.store
            .add_player_rank(player_id, rank.id, expires_at, assigned_by)
            .await?;
        self.cache.invalidate(player_id);

        self.mirror_player_groups(player_id).await;
        Ok(())
    }

    /// Take a rank away from a player
    #[tracing::instrument(skip(self))]
    pub async fn remove_player_rank(&self, player_id: Uuid, rank_name: &str) -> EngineResult<()> {
        let Some(rank) = self.ranks.get_by_name(rank_name) else {
            return Ok(());
        };

        self.store.remove_player_rank(player_id, rank.id).await?;
        self.cache.invalidate(player_id);

        let group = rank.name.clone();
        self.mirror("remove_user_from_group", move |sync| async move {
            sync.remove_user_from_group(player_id, &group).await
        });
        self.mirror_player_groups(player_id).await;
        Ok(())
    }

    /// Grant a personal permission, optionally until `expires_at`
    #[tracing::instrument(skip(self))]
    pub async fn add_player_permission(
        &self,
        player_id: Uuid,
        permission: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> EngineResult<()> {
        self.store
            .add_personal_permission(player_id, permission, expires_at)
            .await?;
        self.cache.invalidate(player_id);

        let permissions = HashSet::from([permission.to_string()]);
        self.mirror("add_user_permissions", move |sync| async move {
            sync.add_user_permissions(player_id, &permissions).await
        });
        Ok(())
    }

    /// Revoke a personal permission
    #[tracing::instrument(skip(self))]
    pub async fn remove_player_permission(
        &self,
        player_id: Uuid,
        permission: &str,
    ) -> EngineResult<()> {
        self.store
            .remove_personal_permission(player_id, permission)
            .await?;
        self.cache.invalidate(player_id);

        let permissions = HashSet::from([permission.to_string()]);
        self.mirror("remove_user_permissions", move |sync| async move {
            sync.remove_user_permissions(player_id, &permissions).await
        });
        Ok(())
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Load a connecting player's permissions and mirror them to native sync
    #[tracing::instrument(skip(self))]
    pub async fn player_joined(&self, player_id: Uuid) -> EngineResult<Arc<PlayerPermissionSet>> {
        let set = self.get_player_permissions(player_id).await?;

        let personal = set.personal_permissions().clone();
        self.mirror("set_user_permissions", move |sync| async move {
            sync.set_user_permissions(player_id, &personal).await
        });
        for rank in set.ranks() {
            let group = rank.name.clone();
            self.mirror("add_user_to_group", move |sync| async move {
                sync.add_user_to_group(player_id, &group).await
            });
        }

        tracing::debug!(
            "Player {} joined with {} ranks and {} personal permissions",
            player_id,
            set.ranks().len(),
            set.personal_permissions().len()
        );
        Ok(set)
    }

    /// Forget a disconnecting player's cached and mirrored permissions
    #[tracing::instrument(skip(self))]
    pub fn player_left(&self, player_id: Uuid) {
        self.cache.invalidate(player_id);
        self.mirror("clear_user_permissions", move |sync| async move {
            sync.clear_user_permissions(player_id).await
        });
    }
}
