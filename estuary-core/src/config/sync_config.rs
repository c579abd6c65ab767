//! Configuration for client sync sessions.
//!
//! # Examples
//!
//! ```
//! use estuary_core::config::{SyncConfig, TieBreak};
//!
//! let config = SyncConfig::default();
//! assert_eq!(config.max_push_attempts, 10);
//! assert_eq!(config.tie_break, TieBreak::Conflict);
//! ```

use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_MAX_PUSH_ATTEMPTS;

/// Policy for two conflicting diffs carrying identical logical timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Surface the tie as a conflict and let the caller decide.
    Conflict,
    /// The lexicographically greater actor wins, deterministically.
    ByActor,
}

/// Configuration for a client sync session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Push attempts before a lost head race is surfaced. Default: 10.
    pub max_push_attempts: u32,
    /// Equal-timestamp conflict policy. Default: surface the conflict.
    pub tie_break: TieBreak,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_push_attempts: DEFAULT_MAX_PUSH_ATTEMPTS,
            tie_break: TieBreak::Conflict,
        }
    }
}
