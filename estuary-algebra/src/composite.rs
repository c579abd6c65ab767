//! Merged algebras over tuple-shaped diffs.
//!
//! A composite diff carries named components, each holding a sub-sequence
//! of diffs governed by its own sub-algebra. Transform, invert, squash, and
//! the empty-predicate all apply component-wise; a conflict in any
//! component is a conflict for the whole operation. This is how
//! higher-level diff types (document edits plus a rename, map changes
//! keyed by sub-structure) are composed without rewriting the algebra.
//!
//! # Examples
//!
//! ```
//! use std::collections::BTreeMap;
//! use estuary_algebra::{Algebra, CompositeSemantics, KvSemantics, composite, kv};
//! use estuary_core::TieBreak;
//!
//! let fields = Algebra::builder()
//!     .register(kv::kind(), KvSemantics::new(TieBreak::ByActor))
//!     .build();
//! let algebra = Algebra::builder()
//!     .register(kv::kind(), KvSemantics::new(TieBreak::ByActor))
//!     .register(
//!         composite::kind(),
//!         CompositeSemantics::builder().component("fields", fields).build(),
//!     )
//!     .build();
//!
//! let mut components = BTreeMap::new();
//! components.insert(
//!     "fields".to_string(),
//!     vec![kv::set("name", serde_json::Value::Null, "Alice", 1, "s1")],
//! );
//! let diff = composite::wrap(components, 1, "s1");
//! assert!(!algebra.diff_is_empty(&diff).unwrap());
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use estuary_core::diff::{Diff, DiffKind, Operation};
use estuary_core::errors::{AlgebraError, EstuaryError};

use crate::algebra::Algebra;
use crate::semantics::{DiffSemantics, Transformed};

/// Kind tag for composite diffs.
pub const COMPOSITE: &str = "composite";

/// The composite kind tag.
pub fn kind() -> DiffKind {
    DiffKind::new(COMPOSITE)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CompositePayload {
    components: BTreeMap<String, Vec<Diff>>,
}

/// Build a composite diff over named component sub-sequences.
pub fn wrap(components: BTreeMap<String, Vec<Diff>>, timestamp: u64, actor: &str) -> Diff {
    let payload = CompositePayload { components };
    Diff::new(
        kind(),
        serde_json::to_value(payload).unwrap_or(serde_json::Value::Null),
        timestamp,
        actor,
    )
}

fn decode(diff: &Diff) -> Result<CompositePayload, AlgebraError> {
    serde_json::from_value(diff.payload.clone()).map_err(|e| AlgebraError::BadPayload {
        kind: COMPOSITE.to_string(),
        reason: e.to_string(),
    })
}

fn demote(err: EstuaryError) -> AlgebraError {
    match err {
        EstuaryError::AlgebraError(inner) => inner,
        other => AlgebraError::BadPayload {
            kind: COMPOSITE.to_string(),
            reason: other.to_string(),
        },
    }
}

/// Component-wise semantics for composite diffs: one sub-algebra per
/// component name.
pub struct CompositeSemantics {
    components: BTreeMap<String, Algebra>,
}

/// Builder for [`CompositeSemantics`].
#[derive(Default)]
pub struct CompositeBuilder {
    components: BTreeMap<String, Algebra>,
}

impl CompositeBuilder {
    /// Declare a component and the algebra governing its sub-diffs.
    pub fn component(mut self, name: &str, algebra: Algebra) -> Self {
        self.components.insert(name.to_string(), algebra);
        self
    }

    /// Finish.
    pub fn build(self) -> CompositeSemantics {
        CompositeSemantics {
            components: self.components,
        }
    }
}

impl CompositeSemantics {
    /// Start declaring components.
    pub fn builder() -> CompositeBuilder {
        CompositeBuilder::default()
    }

    fn algebra_for(&self, name: &str) -> Result<&Algebra, AlgebraError> {
        self.components
            .get(name)
            .ok_or_else(|| AlgebraError::UnknownKind {
                kind: format!("{COMPOSITE}.{name}"),
            })
    }

    fn component_names(
        ours: &CompositePayload,
        theirs: &CompositePayload,
    ) -> Vec<String> {
        let mut names: Vec<String> = ours.components.keys().cloned().collect();
        for name in theirs.components.keys() {
            if !ours.components.contains_key(name) {
                names.push(name.clone());
            }
        }
        names
    }
}

impl DiffSemantics for CompositeSemantics {
    fn transform(&self, ours: &Diff, theirs: &Diff) -> Result<Transformed, AlgebraError> {
        let our_payload = decode(ours)?;
        let their_payload = decode(theirs)?;

        let mut ours_out: BTreeMap<String, Vec<Diff>> = BTreeMap::new();
        let mut theirs_out: BTreeMap<String, Vec<Diff>> = BTreeMap::new();

        for name in Self::component_names(&our_payload, &their_payload) {
            let algebra = self.algebra_for(&name)?;
            let our_seq = our_payload.components.get(&name).cloned().unwrap_or_default();
            let their_seq = their_payload
                .components
                .get(&name)
                .cloned()
                .unwrap_or_default();
            let transformed = algebra
                .transform(
                    &Operation::from_diffs(our_seq),
                    &Operation::from_diffs(their_seq),
                )
                .map_err(demote)?;
            if !transformed.ours.is_empty() {
                ours_out.insert(name.clone(), transformed.ours.into_diffs());
            }
            if !transformed.theirs.is_empty() {
                theirs_out.insert(name, transformed.theirs.into_diffs());
            }
        }

        let ours_result = if ours_out.is_empty() {
            Vec::new()
        } else {
            vec![wrap(ours_out, ours.timestamp, &ours.actor)]
        };
        let theirs_result = if theirs_out.is_empty() {
            Vec::new()
        } else {
            vec![wrap(theirs_out, theirs.timestamp, &theirs.actor)]
        };
        Ok(Transformed {
            ours: ours_result,
            theirs: theirs_result,
        })
    }

    fn invert(&self, diff: &Diff) -> Result<Vec<Diff>, AlgebraError> {
        let payload = decode(diff)?;
        let mut inverted: BTreeMap<String, Vec<Diff>> = BTreeMap::new();
        for (name, sub_diffs) in payload.components {
            let algebra = self.algebra_for(&name)?;
            let inverse = algebra
                .invert(&Operation::from_diffs(sub_diffs))
                .map_err(demote)?;
            if !inverse.is_empty() {
                inverted.insert(name, inverse.into_diffs());
            }
        }
        Ok(vec![wrap(inverted, diff.timestamp, &diff.actor)])
    }

    fn squash_pair(&self, first: &Diff, second: &Diff) -> Result<Option<Diff>, AlgebraError> {
        let first_payload = decode(first)?;
        let second_payload = decode(second)?;

        let mut folded: BTreeMap<String, Vec<Diff>> = BTreeMap::new();
        for name in Self::component_names(&first_payload, &second_payload) {
            let algebra = self.algebra_for(&name)?;
            let mut seq = first_payload
                .components
                .get(&name)
                .cloned()
                .unwrap_or_default();
            seq.extend(
                second_payload
                    .components
                    .get(&name)
                    .cloned()
                    .unwrap_or_default(),
            );
            let squashed = algebra
                .squash(Operation::from_diffs(seq))
                .map_err(demote)?;
            if !squashed.is_empty() {
                folded.insert(name, squashed.into_diffs());
            }
        }
        Ok(Some(wrap(folded, second.timestamp, &second.actor)))
    }

    fn is_empty(&self, diff: &Diff) -> bool {
        let Ok(payload) = decode(diff) else {
            return false;
        };
        payload.components.iter().all(|(name, sub_diffs)| {
            self.algebra_for(name)
                .and_then(|algebra| {
                    algebra
                        .is_empty(&Operation::from_diffs(sub_diffs.clone()))
                        .map_err(demote)
                })
                .unwrap_or(false)
        })
    }
}
