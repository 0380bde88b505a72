//! Permission matching and per-player permission state
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                    PermissionEngine                       │
//! │  ┌────────────────────────────────────────────────────┐  │
//! │  │        PermissionCache (DashMap, TTL)               │  │
//! │  │        Key: player UUID → PlayerPermissionSet       │  │
//! │  └────────────────────────────────────────────────────┘  │
//! │                 │ hit            ▲ miss: load + build     │
//! │                 ▼                │                        │
//! │  ┌──────────────────────┐   ┌─────────┐                   │
//! │  │ PlayerPermissionSet  │──▶│RankIndex│──▶ matcher        │
//! │  │ personal + ranks     │   └─────────┘                   │
//! │  └──────────────────────┘                                 │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Permission Format
//!
//! Permissions are dotted strings:
//! - `kick.player` - a single permission
//! - `kick.*` - every permission below `kick.`
//! - `*` - every permission

pub mod cache;
pub mod matcher;
pub mod player;

pub use cache::{CacheTicket, PermissionCache, DEFAULT_TTL};
pub use matcher::{is_wildcard, matches, GLOBAL_WILDCARD};
pub use player::PlayerPermissionSet;
