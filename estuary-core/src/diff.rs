//! Diffs and operations — the units of change the engine replicates.
//!
//! A [`Diff`] is an atomic, typed description of a change. The engine never
//! inspects the payload; it only dispatches on the kind tag to the algebra
//! functions registered for it. An [`Operation`] is an ordered sequence of
//! diffs; operations compose by concatenation.
//!
//! # Examples
//!
//! ```
//! use estuary_core::diff::{Diff, DiffKind, Operation};
//!
//! let set_name = Diff::new(
//!     DiffKind::new("kv.set"),
//!     serde_json::json!({ "key": "name", "prev": null, "next": "Alice" }),
//!     7,
//!     "session-1",
//! );
//!
//! let mut op = Operation::new();
//! op.push(set_name);
//! assert_eq!(op.len(), 1);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Tag identifying which algebra handles a diff. Application-defined;
/// the built-in key-value kind uses `"kv.set"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DiffKind(String);

impl DiffKind {
    /// Create a kind tag.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The tag as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DiffKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An atomic, typed unit of change.
///
/// The payload is opaque JSON; its shape is a contract between the producer
/// and the semantics registered for `kind`. The logical timestamp orders
/// concurrent writes for last-writer-wins resolution; `actor` identifies
/// the writer and feeds the optional tie-break policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diff {
    /// Which registered algebra handles this diff.
    pub kind: DiffKind,
    /// Opaque, kind-shaped payload.
    pub payload: serde_json::Value,
    /// Logical timestamp of the write.
    pub timestamp: u64,
    /// Identity of the writer (session or repository).
    pub actor: String,
}

impl Diff {
    /// Create a diff.
    pub fn new(
        kind: DiffKind,
        payload: serde_json::Value,
        timestamp: u64,
        actor: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            payload,
            timestamp,
            actor: actor.into(),
        }
    }
}

/// An ordered sequence of diffs. The unit the commit graph labels its
/// edges with, and the unit the algebra transforms, squashes, and inverts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Operation(Vec<Diff>);

impl Operation {
    /// The empty operation.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Wrap an existing diff sequence.
    pub fn from_diffs(diffs: Vec<Diff>) -> Self {
        Self(diffs)
    }

    /// A single-diff operation.
    pub fn single(diff: Diff) -> Self {
        Self(vec![diff])
    }

    /// Append one diff.
    pub fn push(&mut self, diff: Diff) {
        self.0.push(diff);
    }

    /// Compose with another operation by concatenation: `self` then `other`.
    pub fn extend(&mut self, other: Operation) {
        self.0.extend(other.0);
    }

    /// The diff sequence.
    pub fn diffs(&self) -> &[Diff] {
        &self.0
    }

    /// Consume into the diff sequence.
    pub fn into_diffs(self) -> Vec<Diff> {
        self.0
    }

    /// Number of diffs.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when the sequence holds no diffs at all. Semantic emptiness
    /// (diffs with no observable effect) is the algebra's judgement.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl IntoIterator for Operation {
    type Item = Diff;
    type IntoIter = std::vec::IntoIter<Diff>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Operation {
    type Item = &'a Diff;
    type IntoIter = std::slice::Iter<'a, Diff>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl FromIterator<Diff> for Operation {
    fn from_iter<I: IntoIterator<Item = Diff>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
