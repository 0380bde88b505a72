//! Native permission sync
//!
//! Mirrors rank and player grants into a host-owned permission system so
//! code outside the engine can check permissions without calling back in.
//! The mirror is best-effort: calls are queued on a [`SyncDispatcher`] and
//! failures are logged, never returned to the engine's caller.

use std::collections::HashSet;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

pub mod dispatch;
pub mod registry;

pub use dispatch::{SyncDispatcher, DEFAULT_QUEUE_CAPACITY};
pub use registry::HostRegistry;

/// Native sync errors
#[derive(Debug, Error)]
pub enum SyncError {
    /// Host refused the change
    #[error("host rejected sync call: {0}")]
    Rejected(String),

    /// Host permission system is not reachable
    #[error("host permission system unavailable")]
    Unavailable,
}

/// Host permission system the engine mirrors into
///
/// Ranks map to host groups by rank name.
#[async_trait]
pub trait NativeSync: Send + Sync {
    /// Replace a group's permission set
    async fn set_group_permissions(
        &self,
        group: &str,
        permissions: &HashSet<String>,
    ) -> Result<(), SyncError>;

    async fn add_user_to_group(&self, player_id: Uuid, group: &str) -> Result<(), SyncError>;

    async fn remove_user_from_group(&self, player_id: Uuid, group: &str)
        -> Result<(), SyncError>;

    /// Replace a user's own permission set
    async fn set_user_permissions(
        &self,
        player_id: Uuid,
        permissions: &HashSet<String>,
    ) -> Result<(), SyncError>;

    async fn add_user_permissions(
        &self,
        player_id: Uuid,
        permissions: &HashSet<String>,
    ) -> Result<(), SyncError>;

    async fn remove_user_permissions(
        &self,
        player_id: Uuid,
        permissions: &HashSet<String>,
    ) -> Result<(), SyncError>;

    /// Forget everything about a user
    async fn clear_user_permissions(&self, player_id: Uuid) -> Result<(), SyncError>;
}

/// Sync target that accepts and discards everything
///
/// Used when no host permission system is present.
pub struct NoopSync;

#[async_trait]
impl NativeSync for NoopSync {
    async fn set_group_permissions(
        &self,
        _group: &str,
        _permissions: &HashSet<String>,
    ) -> Result<(), SyncError> {
        Ok(())
    }

    async fn add_user_to_group(&self, _player_id: Uuid, _group: &str) -> Result<(), SyncError> {
        Ok(())
    }

    async fn remove_user_from_group(
        &self,
        _player_id: Uuid,
        _group: &str,
    ) -> Result<(), SyncError> {
        Ok(())
    }

    async fn set_user_permissions(
        &self,
        _player_id: Uuid,
        _permissions: &HashSet<String>,
    ) -> Result<(), SyncError> {
        Ok(())
    }

    async fn add_user_permissions(
        &self,
        _player_id: Uuid,
        _permissions: &HashSet<String>,
    ) -> Result<(), SyncError> {
        Ok(())
    }

    async fn remove_user_permissions(
        &self,
        _player_id: Uuid,
        _permissions: &HashSet<String>,
    ) -> Result<(), SyncError> {
        Ok(())
    }

    async fn clear_user_permissions(&self, _player_id: Uuid) -> Result<(), SyncError> {
        Ok(())
    }
}
