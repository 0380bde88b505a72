//! Rank model
//!
//! A [`Rank`] is a named bundle of permissions. It may name another rank as
//! its parent by id; the resolved parent link is filled in by the
//! [`RankIndex`](super::RankIndex) and is always acyclic.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::permissions::matcher;

/// Stable rank identifier assigned by storage
pub type RankId = i64;

/// Display color used when none is given
pub const DEFAULT_COLOR: &str = "#FFFFFF";

/// Persisted rank row, without permissions
///
/// `id` is `None` until storage has assigned one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankRecord {
    pub id: Option<RankId>,
    pub name: String,
    pub display_name: String,
    pub prefix: Option<String>,
    pub color: String,
    pub priority: i32,
    pub parent_id: Option<RankId>,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
}

impl RankRecord {
    /// Create an unsaved record with default color and no parent
    pub fn new(name: &str, display_name: &str) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            display_name: display_name.to_string(),
            prefix: None,
            color: DEFAULT_COLOR.to_string(),
            priority: 0,
            parent_id: None,
            is_default: false,
            created_at: Utc::now(),
        }
    }
}

/// A rank with its direct permissions and resolved parent chain
#[derive(Debug, Clone)]
pub struct Rank {
    pub id: RankId,
    pub name: String,
    pub display_name: String,
    pub prefix: Option<String>,
    pub color: String,
    /// Higher = more senior
    pub priority: i32,
    pub parent_id: Option<RankId>,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    /// Permissions granted by this rank itself
    pub permissions: HashSet<String>,
    parent: Option<Arc<Rank>>,
}

impl Rank {
    /// Create a rank with no permissions and no parent
    pub fn new(id: RankId, name: &str, display_name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            display_name: display_name.to_string(),
            prefix: None,
            color: DEFAULT_COLOR.to_string(),
            priority: 0,
            parent_id: None,
            is_default: false,
            created_at: Utc::now(),
            permissions: HashSet::new(),
            parent: None,
        }
    }

    /// Build a rank from a persisted record
    ///
    /// Returns `None` if the record has not been assigned an id yet.
    pub fn from_record(record: RankRecord, permissions: HashSet<String>) -> Option<Self> {
        Some(Self {
            id: record.id?,
            name: record.name,
            display_name: record.display_name,
            prefix: record.prefix,
            color: record.color,
            priority: record.priority,
            parent_id: record.parent_id,
            is_default: record.is_default,
            created_at: record.created_at,
            permissions,
            parent: None,
        })
    }

    /// Convert back into a persistable record
    pub fn to_record(&self) -> RankRecord {
        RankRecord {
            id: Some(self.id),
            name: self.name.clone(),
            display_name: self.display_name.clone(),
            prefix: self.prefix.clone(),
            color: self.color.clone(),
            priority: self.priority,
            parent_id: self.parent_id,
            is_default: self.is_default,
            created_at: self.created_at,
        }
    }

    /// Builder: set priority
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Builder: set parent id
    pub fn with_parent_id(mut self, parent_id: Option<RankId>) -> Self {
        self.parent_id = parent_id;
        self
    }

    /// Builder: add direct permissions
    pub fn with_permissions(mut self, permissions: &[&str]) -> Self {
        self.permissions.extend(permissions.iter().map(|p| (*p).to_string()));
        self
    }

    /// Builder: set the default flag
    pub fn with_default(mut self, is_default: bool) -> Self {
        self.is_default = is_default;
        self
    }

    /// The resolved parent rank, if the index linked one
    pub fn parent(&self) -> Option<&Arc<Rank>> {
        self.parent.as_ref()
    }

    pub(crate) fn set_parent(&mut self, parent: Option<Arc<Rank>>) {
        self.parent = parent;
    }

    /// A copy without the resolved parent link
    pub(crate) fn detached(&self) -> Self {
        let mut rank = self.clone();
        rank.parent = None;
        rank
    }

    /// Iterate this rank followed by its ancestors, nearest first
    pub fn lineage(&self) -> Lineage<'_> {
        Lineage { next: Some(self) }
    }

    /// Whether this rank or any ancestor grants `permission`
    pub fn has_permission(&self, permission: &str) -> bool {
        self.lineage()
            .any(|rank| matcher::matches(&rank.permissions, permission))
    }

    /// Direct permissions unioned with every ancestor's
    pub fn all_permissions(&self) -> HashSet<String> {
        self.lineage()
            .flat_map(|rank| rank.permissions.iter().cloned())
            .collect()
    }

    /// Case-insensitive name comparison
    pub fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

/// Iterator over a rank and its resolved ancestors
pub struct Lineage<'a> {
    next: Option<&'a Rank>,
}

impl<'a> Iterator for Lineage<'a> {
    type Item = &'a Rank;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.parent.as_deref();
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linked(child: Rank, parent: Rank) -> Rank {
        let mut child = child.with_parent_id(Some(parent.id));
        child.set_parent(Some(Arc::new(parent)));
        child
    }

    #[test]
    fn test_direct_permissions() {
        let rank = Rank::new(1, "mod", "Moderator").with_permissions(&["kick.*"]);

        assert!(rank.has_permission("kick.player"));
        assert!(!rank.has_permission("ban.player"));
        assert!(rank.parent().is_none());
    }

    #[test]
    fn test_inherited_permissions() {
        let parent = Rank::new(1, "parent", "Parent").with_permissions(&["y"]);
        let child = linked(Rank::new(2, "child", "Child").with_permissions(&["x"]), parent);

        assert!(child.has_permission("x"));
        assert!(child.has_permission("y"));
        assert!(!child.has_permission("z"));

        let all = child.all_permissions();
        assert_eq!(all.len(), 2);
        assert!(all.contains("x") && all.contains("y"));
    }

    #[test]
    fn test_lineage_order() {
        let root = Rank::new(1, "root", "Root");
        let mid = linked(Rank::new(2, "mid", "Mid"), root);
        let leaf = linked(Rank::new(3, "leaf", "Leaf"), mid);

        let ids: Vec<RankId> = leaf.lineage().map(|r| r.id).collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }

    #[test]
    fn test_record_round_trip() {
        let mut record = RankRecord::new("vip", "VIP");
        record.id = Some(7);
        record.color = "#FFAA00".to_string();
        record.priority = 5;

        let rank = Rank::from_record(record.clone(), HashSet::new()).unwrap();
        assert_eq!(rank.id, 7);
        assert_eq!(rank.to_record(), record);
    }

    #[test]
    fn test_unsaved_record_has_no_rank() {
        assert!(Rank::from_record(RankRecord::new("vip", "VIP"), HashSet::new()).is_none());
    }

    #[test]
    fn test_is_named_ignores_case() {
        let rank = Rank::new(1, "Admin", "Admin");
        assert!(rank.is_named("admin"));
        assert!(rank.is_named("ADMIN"));
        assert!(!rank.is_named("mod"));
    }
}
