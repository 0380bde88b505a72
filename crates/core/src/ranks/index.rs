//! Rank index - the in-memory directory of all known ranks
//!
//! Ranks are kept in an immutable [`RankTable`] behind a `RwLock<Arc<_>>`.
//! Every write builds a complete new table with all parent links resolved and
//! swaps it in, so readers only ever see a fully linked table.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;

use super::rank::{Rank, RankId};

/// Resolved snapshot of every rank
#[derive(Debug, Default)]
struct RankTable {
    /// Unlinked definitions in insertion order
    definitions: Vec<Rank>,
    /// Linked ranks keyed by id
    by_id: HashMap<RankId, Arc<Rank>>,
    /// Lowercased name -> id
    by_name: HashMap<String, RankId>,
}

impl RankTable {
    fn build(definitions: Vec<Rank>) -> Self {
        let positions: HashMap<RankId, usize> = definitions
            .iter()
            .enumerate()
            .map(|(pos, rank)| (rank.id, pos))
            .collect();

        let mut by_id: HashMap<RankId, Arc<Rank>> = HashMap::with_capacity(definitions.len());

        for rank in &definitions {
            if by_id.contains_key(&rank.id) {
                continue;
            }

            // Walk up until we reach something already linked, a missing
            // parent, or an id we have already seen on this walk.
            let mut chain = Vec::new();
            let mut visited = HashSet::new();
            let mut anchor = None;
            let mut cursor = Some(rank.id);

            while let Some(id) = cursor {
                if let Some(linked) = by_id.get(&id) {
                    anchor = Some(Arc::clone(linked));
                    break;
                }
                if !visited.insert(id) {
                    tracing::warn!(
                        "Rank inheritance cycle detected at rank id {} (starting from '{}'), truncating chain",
                        id,
                        rank.name
                    );
                    break;
                }
                let Some(&pos) = positions.get(&id) else {
                    tracing::debug!("Rank parent id {} does not exist, dropping link", id);
                    break;
                };
                chain.push(pos);
                cursor = definitions[pos].parent_id;
            }

            // Link top-down so each rank points at its finished parent
            for pos in chain.into_iter().rev() {
                let mut linked = definitions[pos].clone();
                linked.set_parent(anchor.take());
                let linked = Arc::new(linked);
                by_id.insert(linked.id, Arc::clone(&linked));
                anchor = Some(linked);
            }
        }

        let by_name = definitions
            .iter()
            .map(|rank| (rank.name.to_lowercase(), rank.id))
            .collect();

        Self {
            definitions,
            by_id,
            by_name,
        }
    }
}

/// Concurrent directory of ranks indexed by id and case-insensitive name
#[derive(Debug, Default)]
pub struct RankIndex {
    table: RwLock<Arc<RankTable>>,
}

impl RankIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    fn snapshot(&self) -> Arc<RankTable> {
        Arc::clone(&self.table.read())
    }

    /// Apply `edit` to a copy of the definitions and swap in the rebuilt table
    ///
    /// The write lock is held for the whole rebuild so concurrent writers
    /// cannot lose each other's edits.
    fn rebuild<R>(&self, edit: impl FnOnce(&mut Vec<Rank>) -> R) -> R {
        let mut table = self.table.write();
        let mut definitions = table.definitions.clone();
        let result = edit(&mut definitions);
        *table = Arc::new(RankTable::build(definitions));
        result
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Replace the whole index
    pub fn load_all(&self, ranks: Vec<Rank>) {
        let definitions: Vec<Rank> = ranks.iter().map(Rank::detached).collect();
        let defaults = definitions.iter().filter(|r| r.is_default).count();
        if defaults > 1 {
            tracing::warn!("{} ranks are flagged default, using the first one", defaults);
        }

        *self.table.write() = Arc::new(RankTable::build(definitions));
        tracing::debug!("Rank index loaded with {} ranks", ranks.len());
    }

    /// Insert or replace a rank, matching by id or by name
    ///
    /// Returns the rank as linked into the new table.
    pub fn put(&self, rank: Rank) -> Arc<Rank> {
        let id = rank.id;
        let rank = rank.detached();
        let inserted = rank.clone();
        self.rebuild(|definitions| {
            definitions.retain(|existing| existing.id == id || !existing.is_named(&rank.name));
            match definitions.iter_mut().find(|existing| existing.id == id) {
                Some(existing) => *existing = rank,
                None => definitions.push(rank),
            }
        });
        self.get_by_id(id).unwrap_or_else(|| Arc::new(inserted))
    }

    /// Remove a rank by name
    ///
    /// Children of the removed rank lose their parent link and fall back to
    /// their own direct permissions. Returns the removed rank.
    pub fn remove(&self, name: &str) -> Option<Arc<Rank>> {
        let removed = self.get_by_name(name)?;
        self.rebuild(|definitions| {
            definitions.retain(|rank| rank.id != removed.id);
            for rank in definitions.iter_mut() {
                if rank.parent_id == Some(removed.id) {
                    rank.parent_id = None;
                }
            }
        });
        Some(removed)
    }

    /// Edit one rank in place by name
    ///
    /// Returns the rebuilt rank, or `None` if no rank has that name.
    pub fn update(&self, name: &str, edit: impl FnOnce(&mut Rank)) -> Option<Arc<Rank>> {
        let id = self.rebuild(|definitions| {
            let rank = definitions.iter_mut().find(|rank| rank.is_named(name))?;
            edit(rank);
            Some(rank.id)
        })?;
        self.get_by_id(id)
    }

    /// Flag one rank as default and clear the flag on all others
    ///
    /// Returns `false` (and changes nothing) if no rank has that name.
    pub fn set_default(&self, name: &str) -> bool {
        if self.get_by_name(name).is_none() {
            return false;
        }
        self.rebuild(|definitions| {
            for rank in definitions.iter_mut() {
                rank.is_default = rank.is_named(name);
            }
        });
        true
    }

    /// Remove every rank
    pub fn clear(&self) {
        *self.table.write() = Arc::new(RankTable::default());
    }

    // ========================================================================
    // Query
    // ========================================================================

    /// Look up a rank by case-insensitive name
    pub fn get_by_name(&self, name: &str) -> Option<Arc<Rank>> {
        let table = self.table.read();
        let id = table.by_name.get(&name.to_lowercase())?;
        table.by_id.get(id).cloned()
    }

    /// Look up a rank by id
    pub fn get_by_id(&self, id: RankId) -> Option<Arc<Rank>> {
        self.table.read().by_id.get(&id).cloned()
    }

    /// The rank flagged default, if any
    pub fn get_default(&self) -> Option<Arc<Rank>> {
        let table = self.snapshot();
        table
            .definitions
            .iter()
            .find(|rank| rank.is_default)
            .and_then(|rank| table.by_id.get(&rank.id).cloned())
    }

    /// All ranks, highest priority first; ties keep insertion order
    pub fn all_sorted_by_priority_desc(&self) -> Vec<Arc<Rank>> {
        let table = self.snapshot();
        let mut ranks: Vec<Arc<Rank>> = table
            .definitions
            .iter()
            .filter_map(|rank| table.by_id.get(&rank.id).cloned())
            .collect();
        // sort_by is stable
        ranks.sort_by(|a, b| b.priority.cmp(&a.priority));
        ranks
    }

    /// Whether linking `rank_id` under `parent_id` would close a cycle
    pub fn would_create_cycle(&self, rank_id: RankId, parent_id: RankId) -> bool {
        if rank_id == parent_id {
            return true;
        }
        self.get_by_id(parent_id)
            .map(|parent| parent.lineage().any(|ancestor| ancestor.id == rank_id))
            .unwrap_or(false)
    }

    /// Number of ranks
    pub fn len(&self) -> usize {
        self.table.read().definitions.len()
    }

    /// Whether the index holds no ranks
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
