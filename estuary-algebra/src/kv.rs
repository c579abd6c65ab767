//! Built-in key-value diff kind: `kv.set`.
//!
//! One diff sets a single key from an expected previous value to a next
//! value. Concurrent writes to the same key resolve last-writer-wins on the
//! logical timestamp; an exact tie is resolved by the configured
//! [`TieBreak`] policy — surfaced as a conflict by default. Writes to
//! disjoint keys commute untouched.
//!
//! # Examples
//!
//! ```
//! use estuary_algebra::{Algebra, KvSemantics, kv};
//! use estuary_core::TieBreak;
//!
//! let algebra = Algebra::builder()
//!     .register(kv::kind(), KvSemantics::new(TieBreak::Conflict))
//!     .build();
//!
//! let a = kv::set("color", serde_json::Value::Null, "red", 1, "s1");
//! let undo = algebra.invert(&estuary_core::Operation::single(a.clone())).unwrap();
//! let mut round_trip = estuary_core::Operation::single(a);
//! round_trip.extend(undo);
//! assert!(algebra.squash(round_trip).unwrap().is_empty());
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use estuary_core::config::TieBreak;
use estuary_core::diff::{Diff, DiffKind, Operation};
use estuary_core::errors::{AlgebraError, EstuaryResult};
use estuary_core::traits::Projection;

use crate::semantics::{DiffSemantics, Transformed};

/// Kind tag for key-value set diffs.
pub const KV_SET: &str = "kv.set";

/// The `kv.set` kind tag.
pub fn kind() -> DiffKind {
    DiffKind::new(KV_SET)
}

/// Payload of a `kv.set` diff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KvPayload {
    /// The key being written.
    pub key: String,
    /// Expected value before the write; `null` for an absent key.
    pub prev: Value,
    /// Value after the write; `null` deletes the key.
    pub next: Value,
}

/// Build a `kv.set` diff.
pub fn set(
    key: &str,
    prev: impl Into<Value>,
    next: impl Into<Value>,
    timestamp: u64,
    actor: &str,
) -> Diff {
    let payload = KvPayload {
        key: key.to_string(),
        prev: prev.into(),
        next: next.into(),
    };
    Diff::new(
        kind(),
        serde_json::to_value(payload).unwrap_or(Value::Null),
        timestamp,
        actor,
    )
}

fn decode(diff: &Diff) -> Result<KvPayload, AlgebraError> {
    serde_json::from_value(diff.payload.clone()).map_err(|e| AlgebraError::BadPayload {
        kind: KV_SET.to_string(),
        reason: e.to_string(),
    })
}

/// Last-writer-wins semantics for `kv.set`.
#[derive(Debug, Clone, Copy)]
pub struct KvSemantics {
    tie_break: TieBreak,
}

impl KvSemantics {
    /// Create semantics with the given equal-timestamp policy.
    pub fn new(tie_break: TieBreak) -> Self {
        Self { tie_break }
    }

    /// Decide whether `ours` beats `theirs`. `None` means an unresolvable
    /// tie under the current policy.
    fn ours_wins(&self, ours: &Diff, theirs: &Diff) -> Option<bool> {
        if ours.timestamp != theirs.timestamp {
            return Some(ours.timestamp > theirs.timestamp);
        }
        match self.tie_break {
            TieBreak::Conflict => None,
            TieBreak::ByActor => Some(ours.actor > theirs.actor),
        }
    }
}

impl DiffSemantics for KvSemantics {
    fn transform(&self, ours: &Diff, theirs: &Diff) -> Result<Transformed, AlgebraError> {
        let our_payload = decode(ours)?;
        let their_payload = decode(theirs)?;

        if our_payload.key != their_payload.key {
            return Ok(Transformed::unchanged(ours, theirs));
        }
        if our_payload.next == their_payload.next {
            // Both sides made the same change; nothing left either way.
            return Ok(Transformed::converged());
        }

        let ours_wins = self.ours_wins(ours, theirs).ok_or_else(|| {
            AlgebraError::Conflict {
                kind: KV_SET.to_string(),
                subject: our_payload.key.clone(),
                reason: format!(
                    "equal logical timestamps {} from actors {:?} and {:?}",
                    ours.timestamp, ours.actor, theirs.actor
                ),
            }
        })?;

        if ours_wins {
            // Their side must adopt our value; our side is already there.
            let catch_up = set(
                &our_payload.key,
                their_payload.next,
                our_payload.next,
                ours.timestamp,
                &ours.actor,
            );
            Ok(Transformed {
                ours: vec![catch_up],
                theirs: Vec::new(),
            })
        } else {
            let catch_up = set(
                &their_payload.key,
                our_payload.next,
                their_payload.next,
                theirs.timestamp,
                &theirs.actor,
            );
            Ok(Transformed {
                ours: Vec::new(),
                theirs: vec![catch_up],
            })
        }
    }

    fn invert(&self, diff: &Diff) -> Result<Vec<Diff>, AlgebraError> {
        let payload = decode(diff)?;
        Ok(vec![set(
            &payload.key,
            payload.next,
            payload.prev,
            diff.timestamp,
            &diff.actor,
        )])
    }

    fn squash_pair(&self, first: &Diff, second: &Diff) -> Result<Option<Diff>, AlgebraError> {
        let first_payload = decode(first)?;
        let second_payload = decode(second)?;
        if first_payload.key != second_payload.key {
            return Ok(None);
        }
        Ok(Some(set(
            &first_payload.key,
            first_payload.prev,
            second_payload.next,
            second.timestamp,
            &second.actor,
        )))
    }

    fn is_empty(&self, diff: &Diff) -> bool {
        decode(diff)
            .map(|payload| payload.prev == payload.next)
            .unwrap_or(false)
    }
}

/// A materialized key→value map, the projection shape used by sessions
/// replicating `kv.set` history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KvState {
    entries: BTreeMap<String, Value>,
}

impl KvState {
    /// An empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of a key, if set.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Number of set keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no key is set.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn apply_diff(&mut self, diff: &Diff) -> EstuaryResult<()> {
        let payload = decode(diff).map_err(estuary_core::EstuaryError::from)?;
        if payload.next.is_null() {
            self.entries.remove(&payload.key);
        } else {
            self.entries.insert(payload.key, payload.next);
        }
        Ok(())
    }
}

impl Projection for KvState {
    fn apply(&mut self, operation: &Operation) -> EstuaryResult<()> {
        for diff in operation.diffs() {
            self.apply_diff(diff)?;
        }
        Ok(())
    }
}
