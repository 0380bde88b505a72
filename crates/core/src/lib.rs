//! Rankguard - Core Logic
//!
//! Hierarchical ranks and permissions for game servers: ranks inherit
//! permissions from a parent, players hold ranks plus personal grants, and
//! permission checks match dot-separated nodes with trailing wildcards.
//!
//! The [`PermissionEngine`] is the entry point. It persists through a
//! [`PermissionStore`] and mirrors ranks and grants into a host permission
//! system through [`NativeSync`].

pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod permissions;
pub mod ranks;
pub mod storage;
pub mod sync;

// Re-export the engine
pub use engine::{spawn_cache_sweeper, PermissionEngine};
pub use error::{EngineError, EngineResult};

// Re-export config types
pub use config::{ConfigError, ConfigResult, EngineConfig};
pub use logging::init_tracing;

// Re-export rank and permission types
pub use permissions::{matches as permission_matches, PermissionCache, PlayerPermissionSet};
pub use ranks::{Rank, RankId, RankIndex, RankRecord};

// Re-export ports and their bundled implementations
pub use storage::{MemoryStore, PermissionStore, StoreError, StoreResult};
pub use sync::{HostRegistry, NativeSync, NoopSync, SyncDispatcher, SyncError};

#[cfg(test)]
mod tests {
    #[test]
    fn test_reexports_match_modules() {
        assert!(crate::permission_matches(
            &["kick.*".to_string()].into_iter().collect(),
            "kick.player"
        ));
        assert_eq!(crate::EngineConfig::default().default_rank.name, "default");
    }
}
