//! Configuration for background history retention.
//!
//! # Examples
//!
//! ```
//! use estuary_core::config::RetentionConfig;
//!
//! let config = RetentionConfig::default();
//! assert!(config.enabled);
//! assert_eq!(config.extra_snapshots_count, 1000);
//! ```

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_EXTRA_SNAPSHOTS_COUNT, DEFAULT_FREEZE_TIMEOUT_SECS, DEFAULT_RETENTION_INTERVAL_SECS,
};

/// Configuration for the retention controller.
///
/// A commit qualifies for snapshotting once it is at least
/// `extra_snapshots_count` commits behind every live head **or** older than
/// `freeze_timeout_secs`. Retention is best-effort; a failed pass is retried
/// on the next tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Whether the periodic task runs at all. Default: true.
    pub enabled: bool,
    /// Commits kept behind the heads before squashing. Default: 1000.
    pub extra_snapshots_count: u64,
    /// Age in seconds after which a commit is frozen. Default: 86_400.
    pub freeze_timeout_secs: u64,
    /// Seconds between retention passes. Default: 3600.
    pub interval_secs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            extra_snapshots_count: DEFAULT_EXTRA_SNAPSHOTS_COUNT,
            freeze_timeout_secs: DEFAULT_FREEZE_TIMEOUT_SECS,
            interval_secs: DEFAULT_RETENTION_INTERVAL_SECS,
        }
    }
}
