//! In-memory [`PermissionStore`]
//!
//! Honors the same contract a database backend would: ids are assigned on
//! insert, names are case-insensitive, and expired grants are filtered out
//! at query time.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::{RwLock as GateLock, RwLockWriteGuard};
use uuid::Uuid;

use super::{PermissionStore, StoreError, StoreResult};
use crate::ranks::{RankId, RankRecord};

#[derive(Debug, Clone)]
struct Assignment {
    expires_at: Option<DateTime<Utc>>,
    assigned_by: Option<Uuid>,
}

#[derive(Debug, Default)]
struct MemoryState {
    next_id: RankId,
    ranks: Vec<RankRecord>,
    rank_permissions: HashMap<RankId, HashSet<String>>,
    player_ranks: HashMap<Uuid, HashMap<RankId, Assignment>>,
    personal: HashMap<Uuid, HashMap<String, Option<DateTime<Utc>>>>,
}

impl MemoryState {
    fn rank_mut(&mut self, name: &str) -> Option<&mut RankRecord> {
        self.ranks
            .iter_mut()
            .find(|rank| rank.name.eq_ignore_ascii_case(name))
    }
}

fn is_live(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    expires_at.map_or(true, |at| at > now)
}

/// Store that keeps everything in process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
    unavailable: AtomicBool,
    failing_deletes: AtomicBool,
    /// Held shared by every call, exclusively by [`MemoryStore::pause`]
    gate: GateLock<()>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with [`StoreError::Unavailable`] until reset
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Release);
    }

    /// Make rank deletes fail with [`StoreError::Backend`] while everything else works
    pub fn set_failing_deletes(&self, failing: bool) {
        self.failing_deletes.store(failing, Ordering::Release);
    }

    /// Hold every call until the returned guard is dropped
    pub async fn pause(&self) -> RwLockWriteGuard<'_, ()> {
        self.gate.write().await
    }

    /// Who assigned `rank_id` to a player, if recorded
    pub fn assigned_by(&self, player_id: Uuid, rank_id: RankId) -> Option<Uuid> {
        self.state
            .read()
            .player_ranks
            .get(&player_id)?
            .get(&rank_id)?
            .assigned_by
    }

    async fn check(&self) -> StoreResult<()> {
        drop(self.gate.read().await);
        if self.unavailable.load(Ordering::Acquire) {
            Err(StoreError::Unavailable)
        } else {
            Ok(())
        }
    }


}

#[async_trait]
impl PermissionStore for MemoryStore {
    async fn load_all_ranks(&self) -> StoreResult<Vec<RankRecord>> {
        self.check().await?;
        Ok(self.state.read().ranks.clone())
    }

    async fn load_rank_permissions(&self, rank_id: RankId) -> StoreResult<HashSet<String>> {
        self.check().await?;
        Ok(self
            .state
            .read()
            .rank_permissions
            .get(&rank_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn save_rank(&self, mut record: RankRecord) -> StoreResult<RankRecord> {
        self.check().await?;
        let mut state = self.state.write();

        let id = match record.id {
            Some(id) => id,
            None => {
                state.next_id += 1;
                state.next_id
            }
        };
        record.id = Some(id);
        state.next_id = state.next_id.max(id);

        let conflict = state
            .ranks
            .iter()
            .any(|rank| rank.id != Some(id) && rank.name.eq_ignore_ascii_case(&record.name));
        if conflict {
            return Err(StoreError::Backend(format!(
                "rank name '{}' already in use",
                record.name
            )));
        }

        match state.ranks.iter_mut().find(|rank| rank.id == Some(id)) {
            Some(existing) => *existing = record.clone(),
            None => state.ranks.push(record.clone()),
        }
        Ok(record)
    }

    async fn update_rank_details(&self, record: &RankRecord) -> StoreResult<bool> {
        self.check().await?;
        let mut state = self.state.write();

        let conflict = state
            .ranks
            .iter()
            .any(|rank| rank.id != record.id && rank.name.eq_ignore_ascii_case(&record.name));
        if conflict {
            return Err(StoreError::Backend(format!(
                "rank name '{}' already in use",
                record.name
            )));
        }

        let Some(rank) = state.ranks.iter_mut().find(|rank| rank.id == record.id) else {
            return Ok(false);
        };
        rank.name = record.name.clone();
        rank.display_name = record.display_name.clone();
        rank.prefix = record.prefix.clone();
        rank.color = record.color.clone();
        rank.priority = record.priority;
        Ok(true)
    }

    async fn delete_rank_by_name(&self, name: &str) -> StoreResult<bool> {
        self.check().await?;
        if self.failing_deletes.load(Ordering::Acquire) {
            return Err(StoreError::Backend(format!("delete of rank '{}' failed", name)));
        }
        let mut state = self.state.write();

        let Some(pos) = state
            .ranks
            .iter()
            .position(|rank| rank.name.eq_ignore_ascii_case(name))
        else {
            return Ok(false);
        };
        let removed = state.ranks.remove(pos);
        let Some(id) = removed.id else {
            return Ok(true);
        };

        state.rank_permissions.remove(&id);
        for assignments in state.player_ranks.values_mut() {
            assignments.remove(&id);
        }
        for rank in state.ranks.iter_mut() {
            if rank.parent_id == Some(id) {
                rank.parent_id = None;
            }
        }
        Ok(true)
    }

    async fn set_default_rank(&self, name: &str) -> StoreResult<()> {
        self.check().await?;
        let mut state = self.state.write();
        if state.rank_mut(name).is_none() {
            return Ok(());
        }
        for rank in state.ranks.iter_mut() {
            rank.is_default = rank.name.eq_ignore_ascii_case(name);
        }
        Ok(())
    }

    async fn set_rank_parent(&self, name: &str, parent_id: Option<RankId>) -> StoreResult<()> {
        self.check().await?;
        if let Some(rank) = self.state.write().rank_mut(name) {
            rank.parent_id = parent_id;
        }
        Ok(())
    }

    async fn add_rank_permission(&self, rank_id: RankId, permission: &str) -> StoreResult<()> {
        self.check().await?;
        self.state
            .write()
            .rank_permissions
            .entry(rank_id)
            .or_default()
            .insert(permission.to_string());
        Ok(())
    }

    async fn remove_rank_permission(&self, rank_id: RankId, permission: &str) -> StoreResult<()> {
        self.check().await?;
        if let Some(perms) = self.state.write().rank_permissions.get_mut(&rank_id) {
            perms.remove(permission);
        }
        Ok(())
    }

    async fn load_player_rank_ids(&self, player_id: Uuid) -> StoreResult<HashSet<RankId>> {
        self.check().await?;
        let now = Utc::now();
        Ok(self
            .state
            .read()
            .player_ranks
            .get(&player_id)
            .map(|assignments| {
                assignments
                    .iter()
                    .filter(|(_, assignment)| is_live(assignment.expires_at, now))
                    .map(|(id, _)| *id)
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn add_player_rank(
        &self,
        player_id: Uuid,
        rank_id: RankId,
        expires_at: Option<DateTime<Utc>>,
        assigned_by: Option<Uuid>,
    ) -> StoreResult<()> {
        self.check().await?;
        self.state
            .write()
            .player_ranks
            .entry(player_id)
            .or_default()
            .insert(
                rank_id,
                Assignment {
                    expires_at,
                    assigned_by,
                },
            );
        Ok(())
    }

    async fn remove_player_rank(&self, player_id: Uuid, rank_id: RankId) -> StoreResult<()> {
        self.check().await?;
        if let Some(assignments) = self.state.write().player_ranks.get_mut(&player_id) {
            assignments.remove(&rank_id);
        }
        Ok(())
    }

    async fn find_players_with_rank(&self, rank_id: RankId) -> StoreResult<HashSet<Uuid>> {
        self.check().await?;
        let now = Utc::now();
        Ok(self
            .state
            .read()
            .player_ranks
            .iter()
            .filter(|(_, assignments)| {
                assignments
                    .get(&rank_id)
                    .is_some_and(|assignment| is_live(assignment.expires_at, now))
            })
            .map(|(player_id, _)| *player_id)
            .collect())
    }

    async fn load_personal_permissions(&self, player_id: Uuid) -> StoreResult<HashSet<String>> {
        self.check().await?;
        let now = Utc::now();
        Ok(self
            .state
            .read()
            .personal
            .get(&player_id)
            .map(|grants| {
                grants
                    .iter()
                    .filter(|(_, expires_at)| is_live(**expires_at, now))
                    .map(|(perm, _)| perm.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn add_personal_permission(
        &self,
        player_id: Uuid,
        permission: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> StoreResult<()> {
        self.check().await?;
        self.state
            .write()
            .personal
            .entry(player_id)
            .or_default()
            .insert(permission.to_string(), expires_at);
        Ok(())
    }

    async fn remove_personal_permission(
        &self,
        player_id: Uuid,
        permission: &str,
    ) -> StoreResult<()> {
        self.check().await?;
        if let Some(grants) = self.state.write().personal.get_mut(&player_id) {
            grants.remove(permission);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn test_save_assigns_and_preserves_ids() {
        let store = MemoryStore::new();

        let first = store.save_rank(RankRecord::new("player", "Player")).await.unwrap();
        let second = store.save_rank(RankRecord::new("mod", "Moderator")).await.unwrap();
        assert_eq!(first.id, Some(1));
        assert_eq!(second.id, Some(2));

        let mut renamed = second.clone();
        renamed.display_name = "Mod".to_string();
        let saved = store.save_rank(renamed).await.unwrap();
        assert_eq!(saved.id, Some(2));

        let all = store.load_all_ranks().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].display_name, "Mod");
    }

    #[tokio::test]
    async fn test_save_rejects_duplicate_name() {
        let store = MemoryStore::new();
        store.save_rank(RankRecord::new("mod", "Moderator")).await.unwrap();

        let result = store.save_rank(RankRecord::new("MOD", "Other")).await;
        assert!(matches!(result, Err(StoreError::Backend(_))));
    }

    #[tokio::test]
    async fn test_delete_cascades() {
        let store = MemoryStore::new();
        let parent = store.save_rank(RankRecord::new("parent", "Parent")).await.unwrap();
        let mut child = RankRecord::new("child", "Child");
        child.parent_id = parent.id;
        store.save_rank(child).await.unwrap();

        let parent_id = parent.id.unwrap();
        let player = Uuid::new_v4();
        store.add_rank_permission(parent_id, "y").await.unwrap();
        store.add_player_rank(player, parent_id, None, None).await.unwrap();

        assert!(store.delete_rank_by_name("PARENT").await.unwrap());
        assert!(!store.delete_rank_by_name("parent").await.unwrap());

        assert!(store.load_rank_permissions(parent_id).await.unwrap().is_empty());
        assert!(store.load_player_rank_ids(player).await.unwrap().is_empty());
        let ranks = store.load_all_ranks().await.unwrap();
        assert_eq!(ranks.len(), 1);
        assert_eq!(ranks[0].parent_id, None);
    }

    #[tokio::test]
    async fn test_set_default_is_exclusive() {
        let store = MemoryStore::new();
        store.save_rank(RankRecord::new("a", "A")).await.unwrap();
        store.save_rank(RankRecord::new("b", "B")).await.unwrap();

        store.set_default_rank("a").await.unwrap();
        store.set_default_rank("b").await.unwrap();
        store.set_default_rank("missing").await.unwrap();

        let defaults: Vec<String> = store
            .load_all_ranks()
            .await
            .unwrap()
            .into_iter()
            .filter(|r| r.is_default)
            .map(|r| r.name)
            .collect();
        assert_eq!(defaults, vec!["b"]);
    }

    #[tokio::test]
    async fn test_expired_grants_are_excluded() {
        let store = MemoryStore::new();
        let player = Uuid::new_v4();
        let past = Utc::now() - Duration::minutes(1);
        let future = Utc::now() + Duration::hours(1);

        store.add_personal_permission(player, "old", Some(past)).await.unwrap();
        store.add_personal_permission(player, "new", Some(future)).await.unwrap();
        store.add_personal_permission(player, "forever", None).await.unwrap();
        store.add_player_rank(player, 1, Some(past), None).await.unwrap();
        let admin = Uuid::new_v4();
        store.add_player_rank(player, 2, None, Some(admin)).await.unwrap();
        assert_eq!(store.assigned_by(player, 2), Some(admin));

        let perms = store.load_personal_permissions(player).await.unwrap();
        assert_eq!(perms.len(), 2);
        assert!(perms.contains("new") && perms.contains("forever"));

        assert_eq!(store.load_player_rank_ids(player).await.unwrap(), HashSet::from([2]));
        assert!(store.find_players_with_rank(1).await.unwrap().is_empty());
        assert_eq!(
            store.find_players_with_rank(2).await.unwrap(),
            HashSet::from([player])
        );
    }

    #[tokio::test]
    async fn test_unavailable_fails_every_call() {
        let store = MemoryStore::new();
        store.set_unavailable(true);

        assert!(matches!(
            store.load_all_ranks().await,
            Err(StoreError::Unavailable)
        ));
        assert!(store
            .load_personal_permissions(Uuid::new_v4())
            .await
            .is_err());

        store.set_unavailable(false);
        assert!(store.load_all_ranks().await.is_ok());
    }

    #[tokio::test]
    async fn test_update_details_keeps_other_columns() {
        let store = MemoryStore::new();
        let parent = store.save_rank(RankRecord::new("parent", "Parent")).await.unwrap();
        let mut vip = RankRecord::new("vip", "VIP");
        vip.parent_id = parent.id;
        let vip = store.save_rank(vip).await.unwrap();
        store.set_default_rank("vip").await.unwrap();

        let mut details = vip.clone();
        details.name = "gold".to_string();
        details.priority = 9;
        details.parent_id = None;
        details.is_default = false;
        assert!(store.update_rank_details(&details).await.unwrap());

        let stored = store
            .load_all_ranks()
            .await
            .unwrap()
            .into_iter()
            .find(|rank| rank.id == vip.id)
            .unwrap();
        assert_eq!(stored.name, "gold");
        assert_eq!(stored.priority, 9);
        assert_eq!(stored.parent_id, parent.id);
        assert!(stored.is_default);

        details.id = Some(99);
        assert!(!store.update_rank_details(&details).await.unwrap());
    }

    #[tokio::test]
    async fn test_failing_deletes_leave_rows() {
        let store = MemoryStore::new();
        store.save_rank(RankRecord::new("mod", "Moderator")).await.unwrap();
        store.set_failing_deletes(true);

        assert!(matches!(
            store.delete_rank_by_name("mod").await,
            Err(StoreError::Backend(_))
        ));
        store.set_rank_parent("mod", None).await.unwrap();
        assert_eq!(store.load_all_ranks().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_pause_holds_calls() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let paused = store.pause().await;

        let load = tokio::spawn({
            let store = std::sync::Arc::clone(&store);
            async move { store.load_all_ranks().await }
        });
        tokio::task::yield_now().await;
        assert!(!load.is_finished());

        drop(paused);
        assert!(load.await.unwrap().unwrap().is_empty());
    }
}
