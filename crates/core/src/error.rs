//! Error types for engine operations

use crate::storage::StoreError;

/// Error type for [`PermissionEngine`](crate::PermissionEngine) operations
///
/// Unknown rank names are not errors: mutations on them are no-ops.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Persistence failed; nothing in memory was changed
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    /// Another rank already uses this name
    #[error("Rank already exists: {0}")]
    RankAlreadyExists(String),

    /// Linking the parent would make the rank inherit from itself
    #[error("Setting '{parent}' as parent of '{rank}' would create an inheritance cycle")]
    InheritanceCycle { rank: String, parent: String },

    /// Storage accepted an insert but returned no id
    #[error("Storage returned rank '{0}' without an id")]
    MissingRankId(String),
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
