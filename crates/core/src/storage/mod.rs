//! Persistence port
//!
//! The engine never talks to a database directly. Everything durable goes
//! through [`PermissionStore`]; a deployment plugs in its own backend and
//! tests use [`MemoryStore`].

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::ranks::{RankId, RankRecord};

pub mod memory;

pub use memory::MemoryStore;

/// Storage errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend cannot be reached
    #[error("storage unavailable")]
    Unavailable,

    /// Backend reported a failure
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Result type for storage operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Durable storage for ranks, memberships and personal grants
#[async_trait]
pub trait PermissionStore: Send + Sync {
    /// Load every rank row.
    async fn load_all_ranks(&self) -> StoreResult<Vec<RankRecord>>;

    /// Load the permissions granted directly by one rank.
    async fn load_rank_permissions(&self, rank_id: RankId) -> StoreResult<HashSet<String>>;

    /// Insert (`id == None`, an id is assigned) or update a rank row.
    async fn save_rank(&self, record: RankRecord) -> StoreResult<RankRecord>;

    /// Update name, display name, prefix, color and priority of the rank
    /// with `record.id`, leaving every other column alone. Returns whether
    /// the rank exists.
    async fn update_rank_details(&self, record: &RankRecord) -> StoreResult<bool>;

    /// Delete a rank and everything attached to it: its permissions, player
    /// memberships and children's parent links. Returns whether it existed.
    async fn delete_rank_by_name(&self, name: &str) -> StoreResult<bool>;

    /// Flag one rank default and clear the flag everywhere else.
    async fn set_default_rank(&self, name: &str) -> StoreResult<()>;

    async fn set_rank_parent(&self, name: &str, parent_id: Option<RankId>) -> StoreResult<()>;

    async fn add_rank_permission(&self, rank_id: RankId, permission: &str) -> StoreResult<()>;

    async fn remove_rank_permission(&self, rank_id: RankId, permission: &str) -> StoreResult<()>;

    /// Ids of the ranks a player holds; expired assignments are excluded.
    async fn load_player_rank_ids(&self, player_id: Uuid) -> StoreResult<HashSet<RankId>>;

    async fn add_player_rank(
        &self,
        player_id: Uuid,
        rank_id: RankId,
        expires_at: Option<DateTime<Utc>>,
        assigned_by: Option<Uuid>,
    ) -> StoreResult<()>;

    async fn remove_player_rank(&self, player_id: Uuid, rank_id: RankId) -> StoreResult<()>;

    async fn find_players_with_rank(&self, rank_id: RankId) -> StoreResult<HashSet<Uuid>>;

    /// A player's personal permissions; expired grants are excluded.
    async fn load_personal_permissions(&self, player_id: Uuid) -> StoreResult<HashSet<String>>;

    async fn add_personal_permission(
        &self,
        player_id: Uuid,
        permission: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> StoreResult<()>;

    async fn remove_personal_permission(&self, player_id: Uuid, permission: &str)
        -> StoreResult<()>;
}
