/// Estuary engine version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Level assigned to root commits.
pub const ROOT_LEVEL: u32 = 1;

/// Default push attempts before a lost race is surfaced.
pub const DEFAULT_MAX_PUSH_ATTEMPTS: u32 = 10;

/// Default number of commits kept behind the heads before retention may
/// squash (matches a generous working window).
pub const DEFAULT_EXTRA_SNAPSHOTS_COUNT: u64 = 1000;

/// Default age before a commit is considered frozen: 24 hours.
pub const DEFAULT_FREEZE_TIMEOUT_SECS: u64 = 86_400;

/// Default retention tick interval: 1 hour.
pub const DEFAULT_RETENTION_INTERVAL_SECS: u64 = 3_600;
