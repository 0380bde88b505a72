//! Permission engine - the single entry point for permission checks
//!
//! Composes the [`RankIndex`], the [`PermissionCache`], a
//! [`PermissionStore`] and a [`NativeSync`] target.
//!
//! Reads go cache → player set → ranks → matcher; a miss loads the player's
//! rank ids and personal grants from storage (concurrently), substitutes the
//! default rank if the player holds none, and caches the result.
//!
//! Writes go storage → index/cache → native sync. Storage failures are
//! returned to the caller with nothing changed in memory; native sync is
//! queued and its failures only logged.
//!
//! # Example
//!
//! ```ignore
//! let engine = Arc::new(PermissionEngine::new(config, store, Arc::new(NoopSync)));
//! engine.initialize().await?;
//!
//! engine.create_rank("mod", "Moderator", Some("[Mod]"), None, 10).await?;
//! engine.add_rank_permission("mod", "kick.*").await?;
//! engine.add_player_rank(player_id, "mod", None, None).await?;
//!
//! if engine.has_permission(player_id, "kick.player").await {
//!     // kick
//! }
//! ```

mod maintenance;
mod players;
mod ranks;

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use futures::future::try_join_all;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::permissions::{PermissionCache, PlayerPermissionSet};
use crate::ranks::{Rank, RankId, RankIndex, RankRecord};
use crate::storage::{PermissionStore, StoreError};
use crate::sync::{NativeSync, SyncDispatcher, SyncError};

pub use maintenance::spawn_cache_sweeper;

/// Hierarchical rank and permission engine
pub struct PermissionEngine {
    config: EngineConfig,
    store: Arc<dyn PermissionStore>,
    sync: Arc<dyn NativeSync>,
    ranks: RankIndex,
    cache: PermissionCache,
    dispatcher: SyncDispatcher,
    /// Serializes rank-level writes so storage and the index change together
    rank_writes: Mutex<()>,
}

impl PermissionEngine {
    /// Create an engine; call [`initialize`](Self::initialize) before use
    ///
    /// Must be called inside a tokio runtime when native sync is enabled.
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn PermissionStore>,
        sync: Arc<dyn NativeSync>,
    ) -> Self {
        let dispatcher = if config.sync.enabled {
            SyncDispatcher::spawn(config.sync.queue_capacity)
        } else {
            SyncDispatcher::disabled()
        };

        Self {
            cache: PermissionCache::new(config.cache_ttl()),
            ranks: RankIndex::new(),
            config,
            store,
            sync,
            dispatcher,
            rank_writes: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ========================================================================
    // Bootstrap
    // ========================================================================

    /// Load every rank from storage, make sure a default rank exists, and
    /// mirror all groups to native sync
    #[tracing::instrument(skip(self))]
    pub async fn initialize(&self) -> EngineResult<()> {
        let _writes = self.rank_writes.lock().await;
        let records = self.store.load_all_ranks().await?;

        let loaded = try_join_all(records.into_iter().map(|record| async move {
            let permissions = match record.id {
                Some(id) => self.store.load_rank_permissions(id).await?,
                None => HashSet::new(),
            };
            Ok::<_, StoreError>((record, permissions))
        }))
        .await?;

        let ranks: Vec<Rank> = loaded
            .into_iter()
            .filter_map(|(record, permissions)| {
                let name = record.name.clone();
                let rank = Rank::from_record(record, permissions);
                if rank.is_none() {
                    tracing::warn!("Skipping stored rank '{}' without an id", name);
                }
                rank
            })
            .collect();

        self.ranks.load_all(ranks);
        self.ensure_default_rank().await?;
        self.cache.invalidate_all();
        self.mirror_all_groups();

        tracing::info!(
            "Permission engine initialized with {} ranks (default: {})",
            self.ranks.len(),
            self.ranks
                .get_default()
                .map(|rank| rank.name.clone())
                .unwrap_or_default()
        );
        Ok(())
    }

    /// Clear all caches and bootstrap again from storage
    #[tracing::instrument(skip(self))]
    pub async fn reload_all(&self) -> EngineResult<()> {
        self.cache.invalidate_all();
        self.initialize().await
    }

    /// Flag the configured fallback rank default if no rank is, creating it
    /// first when it does not exist
    async fn ensure_default_rank(&self) -> EngineResult<()> {
        if self.ranks.get_default().is_some() {
            return Ok(());
        }

        let fallback = &self.config.default_rank;
        if self.ranks.get_by_name(&fallback.name).is_none() {
            let mut record = RankRecord::new(&fallback.name, &fallback.display_name);
            record.prefix = fallback.prefix.clone();
            record.color = fallback.color.clone();
            record.priority = fallback.priority;

            let saved = self.store.save_rank(record).await?;
            let mut rank = Rank::from_record(saved, HashSet::new())
                .ok_or_else(|| EngineError::MissingRankId(fallback.name.clone()))?;
            for permission in &fallback.permissions {
                self.store.add_rank_permission(rank.id, permission).await?;
                rank.permissions.insert(permission.clone());
            }
            self.ranks.put(rank);
            tracing::info!("Created fallback rank '{}'", fallback.name);
        }

        self.store.set_default_rank(&fallback.name).await?;
        self.ranks.set_default(&fallback.name);
        tracing::info!("Rank '{}' flagged as default", fallback.name);
        Ok(())
    }

    // ========================================================================
    // Permission checks
    // ========================================================================

    /// Check if a player has a permission
    ///
    /// Never fails: if the player's permissions cannot be loaded the check
    /// is denied and the error logged.
    pub async fn has_permission(&self, player_id: Uuid, permission: &str) -> bool {
        match self.get_player_permissions(player_id).await {
            Ok(set) => set.has_permission(permission),
            Err(e) => {
                tracing::warn!(
                    "Denying '{}' for {}: could not load permissions: {}",
                    permission,
                    player_id,
                    e
                );
                false
            }
        }
    }

    /// Check if a player has any of the given permissions (denies on error)
    pub async fn has_any_permission(&self, player_id: Uuid, permissions: &[&str]) -> bool {
        match self.get_player_permissions(player_id).await {
            Ok(set) => set.has_any_permission(permissions),
            Err(e) => {
                tracing::warn!("Denying permission check for {}: {}", player_id, e);
                false
            }
        }
    }

    /// Check if a player has all of the given permissions (denies on error)
    pub async fn has_all_permissions(&self, player_id: Uuid, permissions: &[&str]) -> bool {
        match self.get_player_permissions(player_id).await {
            Ok(set) => set.has_all_permissions(permissions),
            Err(e) => {
                tracing::warn!("Denying permission check for {}: {}", player_id, e);
                false
            }
        }
    }

    /// Get a player's permission set, loading it on cache miss
    #[tracing::instrument(skip(self))]
    pub async fn get_player_permissions(
        &self,
        player_id: Uuid,
    ) -> EngineResult<Arc<PlayerPermissionSet>> {
        if let Some(set) = self.cache.get(player_id) {
            return Ok(set);
        }

        let ticket = self.cache.ticket(player_id);
        let (rank_ids, personal) = tokio::try_join!(
            self.store.load_player_rank_ids(player_id),
            self.store.load_personal_permissions(player_id),
        )?;

        let set = Arc::new(self.build_player_set(player_id, &rank_ids, personal));
        if !self.cache.put_if_fresh(ticket, Arc::clone(&set)) {
            tracing::debug!("Permissions for {} changed during load, not caching", player_id);
        }
        Ok(set)
    }

    fn build_player_set(
        &self,
        player_id: Uuid,
        rank_ids: &HashSet<RankId>,
        personal: HashSet<String>,
    ) -> PlayerPermissionSet {
        // Unknown ids are dropped silently
        let mut ranks: Vec<Arc<Rank>> = rank_ids
            .iter()
            .filter_map(|id| self.ranks.get_by_id(*id))
            .collect();
        ranks.sort_by_key(|rank| rank.id);

        if ranks.is_empty() {
            ranks.extend(self.ranks.get_default());
        }

        PlayerPermissionSet::with_grants(player_id, ranks, personal)
    }

    // ========================================================================
    // Rank queries
    // ========================================================================

    /// Look up a rank by case-insensitive name
    pub fn get_rank(&self, name: &str) -> Option<Arc<Rank>> {
        self.ranks.get_by_name(name)
    }

    pub fn get_rank_by_id(&self, id: RankId) -> Option<Arc<Rank>> {
        self.ranks.get_by_id(id)
    }

    /// The rank players without ranks fall back to
    pub fn default_rank(&self) -> Option<Arc<Rank>> {
        self.ranks.get_default()
    }

    /// All ranks, highest priority first
    pub fn all_ranks(&self) -> Vec<Arc<Rank>> {
        self.ranks.all_sorted_by_priority_desc()
    }

    // ========================================================================
    // Cache control
    // ========================================================================

    /// Drop a player's cached permissions
    pub fn invalidate_player_cache(&self, player_id: Uuid) {
        self.cache.invalidate(player_id);
    }

    /// Drop cached permissions of every player that may hold `rank_name`
    pub fn invalidate_rank_cache(&self, rank_name: &str) {
        self.cache.invalidate_for_rank_change(rank_name);
    }

    /// Evict expired cache entries, returning how many were removed
    pub fn cleanup_expired(&self) -> usize {
        self.cache.cleanup_expired()
    }

    /// Number of cached player sets
    pub fn cached_player_count(&self) -> usize {
        self.cache.len()
    }

    // ========================================================================
    // Native sync
    // ========================================================================

    /// Wait until every queued native sync call has run
    pub async fn flush_sync(&self) {
        self.dispatcher.flush().await;
    }

    /// Queue a native sync call built from the sync target
    fn mirror<F, Fut>(&self, op: &'static str, call: F)
    where
        F: FnOnce(Arc<dyn NativeSync>) -> Fut,
        Fut: Future<Output = Result<(), SyncError>> + Send + 'static,
    {
        self.dispatcher.submit(op, call(Arc::clone(&self.sync)));
    }

    /// Mirror one rank's inherited permission set as a host group
    fn mirror_group(&self, rank: &Rank) {
        let group = rank.name.clone();
        let permissions = rank.all_permissions();
        self.mirror("set_group_permissions", move |sync| async move {
            sync.set_group_permissions(&group, &permissions).await
        });
    }

    /// Mirror a player's effective groups after a membership change
    ///
    /// Keeps the default group in step with default substitution: it is
    /// mirrored while the player falls back to it and dropped otherwise.
    async fn mirror_player_groups(&self, player_id: Uuid) {
        let set = match self.get_player_permissions(player_id).await {
            Ok(set) => set,
            Err(e) => {
                tracing::warn!("Could not mirror groups for {}: {}", player_id, e);
                return;
            }
        };

        let groups: Vec<String> = set.ranks().iter().map(|rank| rank.name.clone()).collect();
        let fallback = self
            .ranks
            .get_default()
            .filter(|default| !set.has_rank(&default.name))
            .map(|default| default.name.clone());

        self.mirror("sync_user_groups", move |sync| async move {
            if let Some(fallback) = fallback {
                sync.remove_user_from_group(player_id, &fallback).await?;
            }
            for group in &groups {
                sync.add_user_to_group(player_id, group).await?;
            }
            Ok(())
        });
    }

    /// Mirror every rank; used after changes that can reach descendants
    fn mirror_all_groups(&self) {
        for rank in self.ranks.all_sorted_by_priority_desc() {
            self.mirror_group(&rank);
        }
    }
}
