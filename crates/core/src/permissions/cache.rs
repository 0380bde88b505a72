//! Player permission cache
//!
//! Keeps each player's [`PlayerPermissionSet`] for a fixed TTL so repeated
//! checks do not hit storage. Entries older than the TTL are treated as
//! absent on read and swept by [`PermissionCache::cleanup_expired`].
//!
//! Per-player generation counters plus a global epoch stop a load that
//! started before an invalidation from re-populating the cache with stale
//! data (see [`PermissionCache::ticket`]).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::time::Instant;
use uuid::Uuid;

use super::player::PlayerPermissionSet;

/// Default entry lifetime
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

struct CacheEntry {
    value: Arc<PlayerPermissionSet>,
    cached_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.cached_at) > ttl
    }
}

/// Invalidation state captured before a load
///
/// While a ticket is alive the player's generation counter is kept; it is
/// released when the ticket is dropped or consumed by
/// [`PermissionCache::put_if_fresh`].
pub struct CacheTicket<'a> {
    cache: &'a PermissionCache,
    player_id: Uuid,
    epoch: u64,
    generation: u64,
}

impl CacheTicket<'_> {
    pub fn player_id(&self) -> Uuid {
        self.player_id
    }
}

impl Drop for CacheTicket<'_> {
    fn drop(&mut self) {
        self.cache.release(self.player_id);
    }
}

/// Loads in flight for one player
#[derive(Debug, Default)]
struct PendingLoads {
    generation: u64,
    loads: usize,
}

/// TTL cache of player permission sets
pub struct PermissionCache {
    entries: DashMap<Uuid, CacheEntry>,
    ttl: Duration,
    /// Bumped by every whole-cache invalidation
    epoch: AtomicU64,
    /// Per-player invalidation counters, present only while a load is in flight
    pending: DashMap<Uuid, PendingLoads>,
    /// Held shared by guarded inserts, exclusively by whole-cache clears
    clear_gate: RwLock<()>,
}

impl Default for PermissionCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl PermissionCache {
    /// Create an empty cache with the given TTL
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            epoch: AtomicU64::new(0),
            pending: DashMap::new(),
            clear_gate: RwLock::new(()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Get a live entry, evicting it if it has expired
    pub fn get(&self, player_id: Uuid) -> Option<Arc<PlayerPermissionSet>> {
        let now = Instant::now();
        {
            let entry = self.entries.get(&player_id)?;
            if !entry.is_expired(now, self.ttl) {
                return Some(Arc::clone(&entry.value));
            }
        }

        self.entries
            .remove_if(&player_id, |_, entry| entry.is_expired(now, self.ttl));
        tracing::debug!("Permission cache entry for {} expired", player_id);
        None
    }

    /// Store a value, overwriting any previous entry
    pub fn put(&self, player_id: Uuid, value: Arc<PlayerPermissionSet>) {
        self.entries.insert(
            player_id,
            CacheEntry {
                value,
                cached_at: Instant::now(),
            },
        );
    }

    /// Capture the invalidation state for a player before loading from storage
    pub fn ticket(&self, player_id: Uuid) -> CacheTicket<'_> {
        let epoch = self.epoch.load(Ordering::Acquire);
        let mut pending = self.pending.entry(player_id).or_default();
        pending.loads += 1;

        CacheTicket {
            cache: self,
            player_id,
            epoch,
            generation: pending.generation,
        }
    }

    /// Store a value only if nothing invalidated the player since `ticket`
    ///
    /// Returns whether the value was cached.
    pub fn put_if_fresh(
        &self,
        ticket: CacheTicket<'_>,
        value: Arc<PlayerPermissionSet>,
    ) -> bool {
        let _gate = self.clear_gate.read();
        if self.epoch.load(Ordering::Acquire) != ticket.epoch {
            return false;
        }

        // Holding the pending shard keeps `invalidate` out until the insert lands
        let Some(pending) = self.pending.get(&ticket.player_id) else {
            return false;
        };
        if pending.generation != ticket.generation {
            return false;
        }
        self.put(ticket.player_id, value);
        drop(pending);
        true
    }

    fn release(&self, player_id: Uuid) {
        if let Some(mut pending) = self.pending.get_mut(&player_id) {
            pending.loads = pending.loads.saturating_sub(1);
        }
        self.pending.remove_if(&player_id, |_, pending| pending.loads == 0);
    }

    /// Drop one player's entry
    pub fn invalidate(&self, player_id: Uuid) {
        if let Some(mut pending) = self.pending.get_mut(&player_id) {
            pending.generation += 1;
        }
        self.entries.remove(&player_id);
    }

    /// Drop every entry that may depend on `rank_name`
    ///
    /// Membership is not tracked in reverse, so this clears the whole cache.
    pub fn invalidate_for_rank_change(&self, rank_name: &str) {
        tracing::debug!("Rank '{}' changed, clearing permission cache", rank_name);
        self.invalidate_all();
    }

    /// Drop every entry
    pub fn invalidate_all(&self) {
        let _gate = self.clear_gate.write();
        self.epoch.fetch_add(1, Ordering::AcqRel);
        self.entries.clear();
    }

    /// Evict all expired entries, returning how many were removed
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| !entry.is_expired(now, self.ttl));
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            tracing::debug!("Evicted {} expired permission cache entries", removed);
        }
        removed
    }

    /// Number of stored entries, expired ones included
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of players with a load in flight
    pub fn pending_loads(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set_for(player_id: Uuid, perms: &[&str]) -> Arc<PlayerPermissionSet> {
        let mut set = PlayerPermissionSet::new(player_id);
        for perm in perms {
            set.add_personal_permission(perm);
        }
        Arc::new(set)
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_within_ttl() {
        let cache = PermissionCache::new(DEFAULT_TTL);
        let player = Uuid::new_v4();
        let value = set_for(player, &["fly"]);

        cache.put(player, Arc::clone(&value));
        tokio::time::advance(DEFAULT_TTL).await;

        let hit = cache.get(player).unwrap();
        assert!(Arc::ptr_eq(&hit, &value));
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_after_ttl_is_absent_and_evicts() {
        let cache = PermissionCache::new(DEFAULT_TTL);
        let player = Uuid::new_v4();
        cache.put(player, set_for(player, &["fly"]));

        tokio::time::advance(DEFAULT_TTL + Duration::from_millis(1)).await;

        assert!(cache.get(player).is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_put_overwrites_and_resets_age() {
        let cache = PermissionCache::new(Duration::from_secs(10));
        let player = Uuid::new_v4();

        cache.put(player, set_for(player, &["a"]));
        tokio::time::advance(Duration::from_secs(8)).await;
        cache.put(player, set_for(player, &["b"]));
        tokio::time::advance(Duration::from_secs(8)).await;

        let hit = cache.get(player).unwrap();
        assert!(hit.has_permission("b"));
        assert!(!hit.has_permission("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_expired() {
        let cache = PermissionCache::new(Duration::from_secs(10));
        let old = Uuid::new_v4();
        let fresh = Uuid::new_v4();

        cache.put(old, set_for(old, &[]));
        tokio::time::advance(Duration::from_secs(6)).await;
        cache.put(fresh, set_for(fresh, &[]));
        tokio::time::advance(Duration::from_secs(6)).await;

        assert_eq!(cache.cleanup_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get(fresh).is_some());
    }

    #[test]
    fn test_invalidate_player() {
        let cache = PermissionCache::default();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        cache.put(a, set_for(a, &[]));
        cache.put(b, set_for(b, &[]));

        cache.invalidate(a);

        assert!(cache.get(a).is_none());
        assert!(cache.get(b).is_some());
    }

    #[test]
    fn test_invalidate_for_rank_change_clears_all() {
        let cache = PermissionCache::default();
        for _ in 0..5 {
            let player = Uuid::new_v4();
            cache.put(player, set_for(player, &[]));
        }

        cache.invalidate_for_rank_change("mod");
        assert!(cache.is_empty());
    }

    #[test]
    fn test_stale_ticket_is_rejected() {
        let cache = PermissionCache::default();
        let player = Uuid::new_v4();

        let ticket = cache.ticket(player);
        cache.invalidate(player);
        assert!(!cache.put_if_fresh(ticket, set_for(player, &[])));
        assert!(cache.get(player).is_none());

        let ticket = cache.ticket(player);
        cache.invalidate_all();
        assert!(!cache.put_if_fresh(ticket, set_for(player, &[])));

        let ticket = cache.ticket(player);
        assert!(cache.put_if_fresh(ticket, set_for(player, &[])));
        assert!(cache.get(player).is_some());
    }

    #[test]
    fn test_other_player_invalidation_keeps_ticket_fresh() {
        let cache = PermissionCache::default();
        let player = Uuid::new_v4();
        let other = Uuid::new_v4();

        let ticket = cache.ticket(player);
        cache.invalidate(other);
        assert!(cache.put_if_fresh(ticket, set_for(player, &[])));
    }

    #[test]
    fn test_overlapping_loads_share_invalidation() {
        let cache = PermissionCache::default();
        let player = Uuid::new_v4();

        let first = cache.ticket(player);
        cache.invalidate(player);
        let second = cache.ticket(player);

        assert!(!cache.put_if_fresh(first, set_for(player, &["old"])));
        assert!(cache.put_if_fresh(second, set_for(player, &["new"])));
        assert!(cache.get(player).unwrap().has_permission("new"));
        assert_eq!(cache.pending_loads(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_state_released_after_loads() {
        let cache = PermissionCache::new(Duration::from_secs(10));
        let players: Vec<Uuid> = (0..1000).map(|_| Uuid::new_v4()).collect();

        for player in &players {
            let ticket = cache.ticket(*player);
            assert!(cache.put_if_fresh(ticket, set_for(*player, &[])));
            cache.invalidate(*player);
        }
        for player in &players[..10] {
            // A failed load drops its ticket without caching
            let _ticket = cache.ticket(*player);
        }
        let held = cache.ticket(players[0]);
        assert_eq!(cache.pending_loads(), 1);
        drop(held);

        for player in &players {
            cache.put(*player, set_for(*player, &[]));
        }
        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(cache.cleanup_expired(), 1000);

        assert!(cache.is_empty());
        assert_eq!(cache.pending_loads(), 0);
    }
}
