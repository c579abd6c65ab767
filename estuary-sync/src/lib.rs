//! # estuary-sync
//!
//! The client side of the engine: [`SyncSession`] keeps an optimistic local
//! projection in step with a repository through pull → rebase → push with
//! compare-and-swap retry, [`SyncHub`] hands out one session per repository,
//! and [`RetentionController`] squashes old history into snapshots in the
//! background.

pub mod hub;
pub mod retention;
pub mod session;

pub use hub::SyncHub;
pub use retention::{RetentionController, RetentionHandle, RetentionReport};
pub use session::{SyncReport, SyncSession};
