//! Engine configuration.
//!
//! Config is built once at startup and passed by reference into the
//! engine's entry points; there are no global registries.

pub mod retention_config;
pub mod sync_config;

pub use retention_config::RetentionConfig;
pub use sync_config::{SyncConfig, TieBreak};
