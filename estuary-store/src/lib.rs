//! # estuary-store
//!
//! [`CommitStore`](estuary_core::CommitStore) implementations: a
//! mutex-guarded in-memory store used as the reference implementation in
//! tests, and a SQLite store for durable single-node deployments. Both
//! satisfy the same contract; the engine cannot tell them apart.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
