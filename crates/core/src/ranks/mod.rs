//! Rank definitions and inheritance
//!
//! A rank bundles permissions and may inherit from one parent rank by id.
//! The [`RankIndex`] owns every known rank and resolves parent links; links
//! that would form a cycle or point at a missing rank are dropped.
//!
//! ```text
//!   admin (ban.*) ──parent──▶ mod (kick.*) ──parent──▶ player (chat.send)
//! ```
//!
//! `admin.has_permission("chat.send")` walks the chain upwards and returns `true`.

mod index;
mod rank;

pub use index::RankIndex;
pub use rank::{Lineage, Rank, RankId, RankRecord, DEFAULT_COLOR};
