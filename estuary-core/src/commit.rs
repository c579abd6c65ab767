//! Commits, commit ids, and snapshots — the immutable DAG the engine
//! replicates.
//!
//! A commit labels each parent edge with the operation that transforms the
//! parent's state into this commit's state. Commit ids are blake3 content
//! hashes, which makes cycles unrepresentable (a commit can only reference
//! already-hashed parents) and `save_commit` naturally idempotent.
//!
//! # Examples
//!
//! ```
//! use estuary_core::commit::Commit;
//!
//! let root = Commit::root();
//! assert_eq!(root.level, 1);
//! assert!(root.parents.is_empty());
//! // Deterministic: every repository shares the same root.
//! assert_eq!(root.id, Commit::root().id);
//! ```

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

use crate::diff::Operation;
use crate::errors::{EstuaryResult, StoreError};

/// Globally unique, comparable commit identifier: a blake3 hash of the
/// commit's canonical encoding. Serializes as lowercase hex so it can key
/// JSON maps and SQLite columns directly.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommitId([u8; 32]);

impl CommitId {
    /// Wrap raw hash bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// The raw hash bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex encoding, 64 characters.
    pub fn to_hex(&self) -> String {
        let mut out = String::with_capacity(64);
        for byte in &self.0 {
            out.push_str(&format!("{byte:02x}"));
        }
        out
    }

    /// Parse a 64-character hex encoding.
    pub fn from_hex(input: &str) -> EstuaryResult<Self> {
        let malformed = || StoreError::MalformedCommitId {
            input: input.to_string(),
        };
        if input.len() != 64 {
            return Err(malformed().into());
        }
        let mut bytes = [0u8; 32];
        for (i, chunk) in input.as_bytes().chunks(2).enumerate() {
            let hi = (chunk[0] as char).to_digit(16).ok_or_else(malformed)?;
            let lo = (chunk[1] as char).to_digit(16).ok_or_else(malformed)?;
            bytes[i] = ((hi << 4) | lo) as u8;
        }
        Ok(Self(bytes))
    }

    /// First eight hex characters, for log lines.
    pub fn short(&self) -> String {
        self.to_hex()[..8].to_string()
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommitId({}…)", self.short())
    }
}

impl Serialize for CommitId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for CommitId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let hex = String::deserialize(deserializer)?;
        CommitId::from_hex(&hex).map_err(serde::de::Error::custom)
    }
}

/// An immutable node in the commit DAG. Each parent edge carries the
/// operation that transforms that parent's state into this commit's state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commit {
    /// Content-hash identity.
    pub id: CommitId,
    /// Parent id → edge operation. Empty for a root.
    pub parents: BTreeMap<CommitId, Operation>,
    /// `1 + max(parent levels)`; roots are level 1. Bounds LCA search.
    pub level: u32,
    /// Wall-clock creation time.
    pub timestamp: DateTime<Utc>,
}

impl Commit {
    /// Build a commit over the given parent edges.
    ///
    /// `max_parent_level` is the highest level among the parents (0 when
    /// there are none). The id is the blake3 hash of the canonical JSON
    /// encoding of `(parents, level, timestamp)`; `BTreeMap` keeps the
    /// encoding deterministic.
    pub fn build(
        parents: BTreeMap<CommitId, Operation>,
        max_parent_level: u32,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let level = max_parent_level + 1;
        let id = Self::hash(&parents, level, timestamp);
        Self {
            id,
            parents,
            level,
            timestamp,
        }
    }

    /// The deterministic root commit every repository starts from:
    /// zero parents, level 1, Unix-epoch timestamp.
    pub fn root() -> Self {
        let epoch = Utc.timestamp_opt(0, 0).single().unwrap_or_default();
        Self::build(BTreeMap::new(), 0, epoch)
    }

    /// True when this commit has no parents.
    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }

    fn hash(
        parents: &BTreeMap<CommitId, Operation>,
        level: u32,
        timestamp: DateTime<Utc>,
    ) -> CommitId {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&level.to_le_bytes());
        hasher.update(&timestamp.timestamp_millis().to_le_bytes());
        for (parent, operation) in parents {
            hasher.update(parent.as_bytes());
            // Diff payloads are JSON values, so encoding cannot fail.
            let encoded = serde_json::to_vec(operation.diffs()).unwrap_or_default();
            hasher.update(&(encoded.len() as u64).to_le_bytes());
            hasher.update(&encoded);
        }
        CommitId(*hasher.finalize().as_bytes())
    }
}

/// A precomputed root→commit operation, stored to bound replay cost.
/// Immutable once saved; must equal the squash of the operations along
/// some root-to-commit path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// The commit this snapshot reconstructs.
    pub commit: CommitId,
    /// Squashed root→commit operation.
    pub operation: Operation,
    /// When the snapshot was written.
    pub created: DateTime<Utc>,
}

impl Snapshot {
    /// Create a snapshot record.
    pub fn new(commit: CommitId, operation: Operation, created: DateTime<Utc>) -> Self {
        Self {
            commit,
            operation,
            created,
        }
    }
}
