//! Rank mutations
//!
//! Every operation persists first, then updates the index and clears the
//! player cache, then queues native sync. Unknown rank names are no-ops.
//! Rank writes hold `rank_writes` throughout, so two of them never
//! interleave between storage and the index.

use std::collections::HashSet;
use std::sync::Arc;

use super::PermissionEngine;
use crate::error::{EngineError, EngineResult};
use crate::ranks::{Rank, RankRecord, DEFAULT_COLOR};

impl PermissionEngine {
    /// Create a rank with no permissions and no parent
    #[tracing::instrument(skip(self))]
    pub async fn create_rank(
        &self,
        name: &str,
        display_name: &str,
        prefix: Option<&str>,
        color: Option<&str>,
        priority: i32,
    ) -> EngineResult<Arc<Rank>> {
        let _writes = self.rank_writes.lock().await;
        if self.ranks.get_by_name(name).is_some() {
            return Err(EngineError::RankAlreadyExists(name.to_string()));
        }

        let mut record = RankRecord::new(name, display_name);
        record.prefix = prefix.map(str::to_string);
        record.color = color.unwrap_or(DEFAULT_COLOR).to_string();
        record.priority = priority;

        let saved = self.store.save_rank(record).await?;
        let rank = Rank::from_record(saved, HashSet::new())
            .ok_or_else(|| EngineError::MissingRankId(name.to_string()))?;
        let rank = self.ranks.put(rank);

        self.mirror_group(&rank);
        tracing::info!("Created rank '{}' (id {})", rank.name, rank.id);
        Ok(rank)
    }

    /// Delete a rank by name
    ///
    /// Children keep their own permissions but lose the inherited ones;
    /// holders lose the rank. Storage drops the children's parent links as
    /// part of the delete. Returns whether storage had the rank.
    #[tracing::instrument(skip(self))]
    pub async fn delete_rank(&self, name: &str) -> EngineResult<bool> {
        let _writes = self.rank_writes.lock().await;
        let Some(rank) = self.ranks.get_by_name(name) else {
            return Ok(false);
        };

        let holders = self.store.find_players_with_rank(rank.id).await?;
        let children: Vec<Arc<Rank>> = self
            .ranks
            .all_sorted_by_priority_desc()
            .into_iter()
            .filter(|child| child.parent_id == Some(rank.id))
            .collect();
        let deleted = self.store.delete_rank_by_name(&rank.name).await?;

        self.ranks.remove(&rank.name);
        self.cache.invalidate_for_rank_change(&rank.name);
        if rank.is_default {
            tracing::warn!(
                "Default rank '{}' deleted; players without ranks have none until a new default is set",
                rank.name
            );
        }

        for player_id in holders {
            let group = rank.name.clone();
            self.mirror("remove_user_from_group", move |sync| async move {
                sync.remove_user_from_group(player_id, &group).await
            });
        }
        let group = rank.name.clone();
        self.mirror("set_group_permissions", move |sync| async move {
            sync.set_group_permissions(&group, &HashSet::new()).await
        });
        self.mirror_all_groups();

        tracing::info!("Deleted rank '{}' ({} children unlinked)", rank.name, children.len());
        Ok(deleted)
    }

    /// Update a rank's name and display attributes
    ///
    /// Matches by `rank.id`. Parent, default flag and permissions have their
    /// own operations and are left untouched. Returns `None` if no rank has
    /// that id.
    #[tracing::instrument(skip(self, rank), fields(rank_id = rank.id))]
    pub async fn update_rank(&self, rank: &Rank) -> EngineResult<Option<Arc<Rank>>> {
        let _writes = self.rank_writes.lock().await;
        let Some(current) = self.ranks.get_by_id(rank.id) else {
            return Ok(None);
        };

        let renamed = !current.is_named(&rank.name);
        if renamed && self.ranks.get_by_name(&rank.name).is_some() {
            return Err(EngineError::RankAlreadyExists(rank.name.clone()));
        }

        let mut details = current.to_record();
        details.name = rank.name.clone();
        details.display_name = rank.display_name.clone();
        details.prefix = rank.prefix.clone();
        details.color = rank.color.clone();
        details.priority = rank.priority;

        if !self.store.update_rank_details(&details).await? {
            return Ok(None);
        }
        let holders = if renamed {
            self.store.find_players_with_rank(rank.id).await?
        } else {
            HashSet::new()
        };

        let Some(updated) = self.ranks.update(&current.name, |stored| {
            stored.name = details.name;
            stored.display_name = details.display_name;
            stored.prefix = details.prefix;
            stored.color = details.color;
            stored.priority = details.priority;
        }) else {
            return Ok(None);
        };
        self.cache.invalidate_for_rank_change(&updated.name);

        if renamed {
            let old_group = current.name.clone();
            self.mirror("set_group_permissions", move |sync| async move {
                sync.set_group_permissions(&old_group, &HashSet::new()).await
            });
            for player_id in holders {
                let old_group = current.name.clone();
                let new_group = updated.name.clone();
                self.mirror("move_user_group", move |sync| async move {
                    sync.remove_user_from_group(player_id, &old_group).await?;
                    sync.add_user_to_group(player_id, &new_group).await
                });
            }
        }
        self.mirror_all_groups();

        Ok(Some(updated))
    }

    /// Set or clear a rank's parent
    ///
    /// Unknown rank or parent names are no-ops. Refuses links that would
    /// make a rank inherit from itself.
    #[tracing::instrument(skip(self))]
    pub async fn set_rank_parent(&self, name: &str, parent_name: Option<&str>) -> EngineResult<()> {
        let _writes = self.rank_writes.lock().await;
        let Some(rank) = self.ranks.get_by_name(name) else {
            return Ok(());
        };

        let parent = match parent_name {
            Some(parent_name) => match self.ranks.get_by_name(parent_name) {
                Some(parent) => Some(parent),
                None => return Ok(()),
            },
            None => None,
        };

        if let Some(parent) = &parent {
            if self.ranks.would_create_cycle(rank.id, parent.id) {
                return Err(EngineError::InheritanceCycle {
                    rank: rank.name.clone(),
                    parent: parent.name.clone(),
                });
            }
        }

        let parent_id = parent.map(|parent| parent.id);
        self.store.set_rank_parent(&rank.name, parent_id).await?;

        self.ranks.update(&rank.name, |rank| rank.parent_id = parent_id);
        self.cache.invalidate_for_rank_change(&rank.name);
        self.mirror_all_groups();
        Ok(())
    }

    /// Make a rank the default, clearing the flag on the previous one
    #[tracing::instrument(skip(self))]
    pub async fn set_default_rank(&self, name: &str) -> EngineResult<()> {
        let _writes = self.rank_writes.lock().await;
        let Some(rank) = self.ranks.get_by_name(name) else {
            return Ok(());
        };

        self.store.set_default_rank(&rank.name).await?;
        self.ranks.set_default(&rank.name);
        self.cache.invalidate_for_rank_change(&rank.name);
        self.mirror_all_groups();
        tracing::info!("Rank '{}' is now the default rank", rank.name);
        Ok(())
    }

    /// Grant a permission to a rank (and so to its descendants)
    #[tracing::instrument(skip(self))]
    pub async fn add_rank_permission(&self, name: &str, permission: &str) -> EngineResult<()> {
        let _writes = self.rank_writes.lock().await;
        let Some(rank) = self.ranks.get_by_name(name) else {
            return Ok(());
        };

        self.store.add_rank_permission(rank.id, permission).await?;
        self.ranks.update(&rank.name, |rank| {
            rank.permissions.insert(permission.to_string());
        });
        self.cache.invalidate_for_rank_change(&rank.name);
        self.mirror_all_groups();
        Ok(())
    }

    /// Revoke a permission from a rank
    #[tracing::instrument(skip(self))]
    pub async fn remove_rank_permission(&self, name: &str, permission: &str) -> EngineResult<()> {
        let _writes = self.rank_writes.lock().await;
        let Some(rank) = self.ranks.get_by_name(name) else {
            return Ok(());
        };

        self.store.remove_rank_permission(rank.id, permission).await?;
        self.ranks.update(&rank.name, |rank| {
            rank.permissions.remove(permission);
        });
        self.cache.invalidate_for_rank_change(&rank.name);
        self.mirror_all_groups();
        Ok(())
    }
}
