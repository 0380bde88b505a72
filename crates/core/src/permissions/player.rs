//! Per-player permission view
//!
//! Combines the ranks a player holds with the permissions granted to them
//! personally. Mutators only touch this in-memory value; persisting changes
//! is the engine's job.

use std::collections::HashSet;
use std::sync::Arc;

use uuid::Uuid;

use super::matcher;
use crate::ranks::{Rank, RankId};

/// Everything that decides what one player may do
#[derive(Debug, Clone)]
pub struct PlayerPermissionSet {
    player_id: Uuid,
    ranks: Vec<Arc<Rank>>,
    personal_permissions: HashSet<String>,
}

impl PlayerPermissionSet {
    /// Create an empty set for a player
    pub fn new(player_id: Uuid) -> Self {
        Self {
            player_id,
            ranks: Vec::new(),
            personal_permissions: HashSet::new(),
        }
    }

    /// Create a set from resolved ranks and personal permissions
    ///
    /// Duplicate ranks (same id) are kept once.
    pub fn with_grants(
        player_id: Uuid,
        ranks: Vec<Arc<Rank>>,
        personal_permissions: HashSet<String>,
    ) -> Self {
        let mut set = Self::new(player_id);
        set.set_ranks(ranks);
        set.personal_permissions = personal_permissions;
        set
    }

    pub fn player_id(&self) -> Uuid {
        self.player_id
    }

    pub fn ranks(&self) -> &[Arc<Rank>] {
        &self.ranks
    }

    pub fn personal_permissions(&self) -> &HashSet<String> {
        &self.personal_permissions
    }

    // ========================================================================
    // Query
    // ========================================================================

    /// Check a permission against personal grants, then each rank
    pub fn has_permission(&self, permission: &str) -> bool {
        matcher::matches(&self.personal_permissions, permission)
            || self.ranks.iter().any(|rank| rank.has_permission(permission))
    }

    /// Check if any of the given permissions is granted
    pub fn has_any_permission(&self, permissions: &[&str]) -> bool {
        permissions.iter().any(|p| self.has_permission(p))
    }

    /// Check if all of the given permissions are granted
    pub fn has_all_permissions(&self, permissions: &[&str]) -> bool {
        permissions.iter().all(|p| self.has_permission(p))
    }

    /// Personal permissions unioned with every rank's inherited set
    pub fn all_permissions(&self) -> HashSet<String> {
        let mut all = self.personal_permissions.clone();
        for rank in &self.ranks {
            all.extend(rank.all_permissions());
        }
        all
    }

    /// Highest-priority rank; on ties the first one added wins
    pub fn primary_rank(&self) -> Option<&Arc<Rank>> {
        self.ranks.iter().fold(None, |best: Option<&Arc<Rank>>, rank| match best {
            Some(current) if current.priority >= rank.priority => Some(current),
            _ => Some(rank),
        })
    }

    /// Chat prefix of the primary rank
    pub fn display_prefix(&self) -> Option<&str> {
        self.primary_rank()?.prefix.as_deref()
    }

    /// Display color of the primary rank
    pub fn display_color(&self) -> Option<&str> {
        self.primary_rank().map(|rank| rank.color.as_str())
    }

    /// Whether the player holds a rank with this name
    pub fn has_rank(&self, name: &str) -> bool {
        self.ranks.iter().any(|rank| rank.is_named(name))
    }

    /// Ids of all held ranks
    pub fn rank_ids(&self) -> HashSet<RankId> {
        self.ranks.iter().map(|rank| rank.id).collect()
    }

    // ========================================================================
    // Mutation (in-memory only)
    // ========================================================================

    /// Add a rank unless one with the same id is already held
    pub fn add_rank(&mut self, rank: Arc<Rank>) {
        if !self.ranks.iter().any(|held| held.id == rank.id) {
            self.ranks.push(rank);
        }
    }

    /// Remove a rank by id
    pub fn remove_rank(&mut self, rank_id: RankId) {
        self.ranks.retain(|rank| rank.id != rank_id);
    }

    /// Replace all ranks
    pub fn set_ranks(&mut self, ranks: Vec<Arc<Rank>>) {
        self.ranks.clear();
        for rank in ranks {
            self.add_rank(rank);
        }
    }

    pub fn add_personal_permission(&mut self, permission: &str) {
        self.personal_permissions.insert(permission.to_string());
    }

    pub fn remove_personal_permission(&mut self, permission: &str) {
        self.personal_permissions.remove(permission);
    }

    /// Replace all personal permissions
    pub fn set_personal_permissions(&mut self, permissions: HashSet<String>) {
        self.personal_permissions = permissions;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranks::RankIndex;

    fn ranks() -> RankIndex {
        let index = RankIndex::new();
        index.load_all(vec![
            Rank::new(1, "player", "Player").with_permissions(&["chat.send"]),
            Rank::new(2, "mod", "Moderator")
                .with_priority(10)
                .with_parent_id(Some(1))
                .with_permissions(&["kick.*"]),
            Rank::new(3, "helper", "Helper")
                .with_priority(10)
                .with_permissions(&["mute.player"]),
        ]);
        index
    }

    #[test]
    fn test_empty_set_denies() {
        let set = PlayerPermissionSet::new(Uuid::new_v4());

        assert!(!set.has_permission("chat.send"));
        assert!(set.primary_rank().is_none());
        assert!(set.all_permissions().is_empty());
        assert!(set.display_color().is_none());
    }

    #[test]
    fn test_rank_and_personal_permissions() {
        let index = ranks();
        let mut set = PlayerPermissionSet::new(Uuid::new_v4());
        set.add_rank(index.get_by_name("mod").unwrap());
        set.add_personal_permission("ban.player");

        assert!(set.has_permission("kick.player"));
        assert!(set.has_permission("chat.send"));
        assert!(set.has_permission("ban.player"));
        assert!(!set.has_permission("ban.all"));

        let all = set.all_permissions();
        assert!(all.contains("kick.*"));
        assert!(all.contains("chat.send"));
        assert!(all.contains("ban.player"));
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_primary_rank_highest_priority_first_on_tie() {
        let index = ranks();
        let set = PlayerPermissionSet::with_grants(
            Uuid::new_v4(),
            vec![
                index.get_by_name("player").unwrap(),
                index.get_by_name("helper").unwrap(),
                index.get_by_name("mod").unwrap(),
            ],
            HashSet::new(),
        );

        assert_eq!(set.primary_rank().map(|r| r.name.as_str()), Some("helper"));
        assert_eq!(set.display_color(), Some("#FFFFFF"));
    }

    #[test]
    fn test_rank_mutators() {
        let index = ranks();
        let mut set = PlayerPermissionSet::new(Uuid::new_v4());

        set.add_rank(index.get_by_name("mod").unwrap());
        set.add_rank(index.get_by_name("mod").unwrap());
        assert_eq!(set.ranks().len(), 1);
        assert!(set.has_rank("MOD"));

        set.remove_rank(2);
        assert!(!set.has_rank("mod"));
        assert!(!set.has_permission("kick.player"));

        set.set_ranks(vec![
            index.get_by_name("player").unwrap(),
            index.get_by_name("helper").unwrap(),
        ]);
        assert_eq!(set.rank_ids(), HashSet::from([1, 3]));
    }

    #[test]
    fn test_personal_mutators() {
        let mut set = PlayerPermissionSet::new(Uuid::new_v4());

        set.add_personal_permission("fly");
        assert!(set.has_permission("fly"));

        set.remove_personal_permission("fly");
        assert!(!set.has_permission("fly"));

        set.set_personal_permissions(HashSet::from(["home.*".to_string()]));
        assert!(set.has_permission("home.set"));
    }

    #[test]
    fn test_has_any_all() {
        let mut set = PlayerPermissionSet::new(Uuid::new_v4());
        set.add_personal_permission("kick.player");
        set.add_personal_permission("ban.player");

        assert!(set.has_any_permission(&["kick.player", "slay.player"]));
        assert!(!set.has_any_permission(&["slay.player", "cvar.set"]));
        assert!(set.has_all_permissions(&["kick.player", "ban.player"]));
        assert!(!set.has_all_permissions(&["kick.player", "slay.player"]));
    }
}
