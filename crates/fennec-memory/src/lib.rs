//! # fennec-memory
//!
//! Two-tier memory for the Fennec agent:
//!
//! - **Short-term**: per-task conversation buffers held in RAM, bounded by a
//!   configurable turn count with FIFO eviction. Exclusively owned per task.
//! - **Long-term**: write-once, similarity-indexed memory records persisted
//!   to SQLite and queried by cosine similarity over an in-memory index.
//!   Shared-read, append-only-write.
//!
//! The [`MemoryStore`] unifies both tiers behind one handle and additionally
//! persists every conversation turn append-only for the dashboard's
//! read-only query contract.

pub mod long_term;
pub mod short_term;
pub mod store;

pub use long_term::{LongTermIndex, MemoryRecord, QueryFilter};
pub use short_term::ShortTermMemory;
pub use store::{MemoryOptions, MemoryStore};
