//! The algebra registry and operation-level reconciliation.
//!
//! An [`Algebra`] maps diff kinds to their registered semantics and lifts
//! the four per-diff functions to whole operations. It is built once at
//! startup by [`AlgebraBuilder`] and passed by reference into the engine;
//! there is no global registration.
//!
//! # Examples
//!
//! ```
//! use estuary_algebra::{Algebra, KvSemantics};
//! use estuary_algebra::kv;
//! use estuary_core::TieBreak;
//!
//! let algebra = Algebra::builder()
//!     .register(kv::kind(), KvSemantics::new(TieBreak::ByActor))
//!     .build();
//!
//! let null = serde_json::Value::Null;
//! let ours = kv::set("name", null.clone(), "Alice", 2, "s1");
//! let theirs = kv::set("name", null, "Bob", 1, "s2");
//! let t = algebra.transform_diffs(&ours, &theirs).unwrap();
//! // The later write wins: their side must adopt "Alice", our side is done.
//! assert_eq!(t.theirs.len(), 0);
//! assert_eq!(t.ours.len(), 1);
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use estuary_core::diff::{Diff, DiffKind, Operation};
use estuary_core::errors::{AlgebraError, EstuaryResult};

use crate::semantics::{DiffSemantics, Transformed};

/// Operation-level transform result. Same diamond reading as
/// [`Transformed`]: `base · ours · result.theirs == base · theirs · result.ours`.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformedOps {
    /// `ours`, rebased to apply on top of `theirs`.
    pub ours: Operation,
    /// `theirs`, rebased to apply on top of `ours`.
    pub theirs: Operation,
}

/// Immutable registry of diff semantics, keyed by kind.
#[derive(Clone)]
pub struct Algebra {
    semantics: HashMap<DiffKind, Arc<dyn DiffSemantics>>,
}

/// Builder for [`Algebra`]. Registration is resolved here, once; unknown
/// kinds encountered later are malformed operations, not late lookups.
#[derive(Default)]
pub struct AlgebraBuilder {
    semantics: HashMap<DiffKind, Arc<dyn DiffSemantics>>,
}

impl AlgebraBuilder {
    /// Register semantics for a diff kind. A later registration for the
    /// same kind replaces the earlier one.
    pub fn register(mut self, kind: DiffKind, semantics: impl DiffSemantics + 'static) -> Self {
        self.semantics.insert(kind, Arc::new(semantics));
        self
    }

    /// Register already-shared semantics (used by composite algebras).
    pub fn register_arc(mut self, kind: DiffKind, semantics: Arc<dyn DiffSemantics>) -> Self {
        self.semantics.insert(kind, semantics);
        self
    }

    /// Finish the registry.
    pub fn build(self) -> Algebra {
        Algebra {
            semantics: self.semantics,
        }
    }
}

impl Algebra {
    /// Start building a registry.
    pub fn builder() -> AlgebraBuilder {
        AlgebraBuilder::default()
    }

    fn semantics_for(&self, kind: &DiffKind) -> Result<&Arc<dyn DiffSemantics>, AlgebraError> {
        self.semantics.get(kind).ok_or_else(|| AlgebraError::UnknownKind {
            kind: kind.as_str().to_string(),
        })
    }

    /// True when the diff has no observable effect.
    pub fn diff_is_empty(&self, diff: &Diff) -> EstuaryResult<bool> {
        Ok(self.semantics_for(&diff.kind)?.is_empty(diff))
    }

    /// Transform two concurrent diffs.
    ///
    /// Diffs of different kinds are independent and pass through unchanged;
    /// an empty diff on either side transforms to no change for the other.
    /// Same-kind pairs dispatch to the registered semantics.
    pub fn transform_diffs(&self, ours: &Diff, theirs: &Diff) -> EstuaryResult<Transformed> {
        let ours_sem = self.semantics_for(&ours.kind)?;
        let theirs_sem = self.semantics_for(&theirs.kind)?;

        if ours_sem.is_empty(ours) || theirs_sem.is_empty(theirs) {
            return Ok(Transformed::unchanged(ours, theirs));
        }
        if ours.kind != theirs.kind {
            return Ok(Transformed::unchanged(ours, theirs));
        }

        let result = ours_sem.transform(ours, theirs);
        if let Err(AlgebraError::Conflict { kind, subject, .. }) = &result {
            debug!(%kind, %subject, "transform conflict");
        }
        Ok(result?)
    }

    /// Transform two concurrent operations applied to the same base state.
    pub fn transform(&self, ours: &Operation, theirs: &Operation) -> EstuaryResult<TransformedOps> {
        let (ours_out, theirs_out) = self.transform_seqs(ours.diffs(), theirs.diffs())?;
        Ok(TransformedOps {
            ours: Operation::from_diffs(ours_out),
            theirs: Operation::from_diffs(theirs_out),
        })
    }

    /// Sequence-against-sequence transform, defined inductively from the
    /// single-diff case: the head of one side is threaded through the whole
    /// other side, then the tail through the already-updated remainder.
    fn transform_seqs(
        &self,
        ours: &[Diff],
        theirs: &[Diff],
    ) -> EstuaryResult<(Vec<Diff>, Vec<Diff>)> {
        if ours.is_empty() || theirs.is_empty() {
            return Ok((ours.to_vec(), theirs.to_vec()));
        }
        if ours.len() == 1 && theirs.len() == 1 {
            let t = self.transform_diffs(&ours[0], &theirs[0])?;
            return Ok((t.ours, t.theirs));
        }
        if ours.len() == 1 {
            let (head, rest) = theirs.split_at(1);
            let (ours1, theirs_head) = self.transform_seqs(ours, head)?;
            let (ours2, theirs_rest) = self.transform_seqs(&ours1, rest)?;
            let mut theirs_out = theirs_head;
            theirs_out.extend(theirs_rest);
            return Ok((ours2, theirs_out));
        }
        let (head, rest) = ours.split_at(1);
        let (ours_head, theirs1) = self.transform_seqs(head, theirs)?;
        let (ours_rest, theirs2) = self.transform_seqs(rest, &theirs1)?;
        let mut ours_out = ours_head;
        ours_out.extend(ours_rest);
        Ok((ours_out, theirs2))
    }

    /// Compact an operation: drop empty diffs, fold adjacent same-kind
    /// pairs through the registered `squash_pair`. The result is never
    /// longer than the input.
    pub fn squash(&self, operation: Operation) -> EstuaryResult<Operation> {
        let mut out: Vec<Diff> = Vec::new();
        for diff in operation {
            let semantics = self.semantics_for(&diff.kind)?;
            if semantics.is_empty(&diff) {
                continue;
            }
            let mut current = Some(diff);
            while let Some(diff) = current.take() {
                let foldable = out
                    .last()
                    .map(|prev| prev.kind == diff.kind)
                    .unwrap_or(false);
                if !foldable {
                    out.push(diff);
                    break;
                }
                let semantics = self.semantics_for(&diff.kind)?;
                let prev = match out.pop() {
                    Some(prev) => prev,
                    None => {
                        out.push(diff);
                        break;
                    }
                };
                match semantics.squash_pair(&prev, &diff)? {
                    Some(folded) => {
                        if semantics.is_empty(&folded) {
                            // Annihilated; the new tail may fold with the
                            // next incoming diff instead.
                            break;
                        }
                        // Try folding the combined diff further down.
                        current = Some(folded);
                    }
                    None => {
                        out.push(prev);
                        out.push(diff);
                        break;
                    }
                }
            }
        }
        Ok(Operation::from_diffs(out))
    }

    /// Invert an operation: per-diff inverses, in reverse order.
    /// Squashing `op` followed by `invert(op)` yields an empty operation.
    pub fn invert(&self, operation: &Operation) -> EstuaryResult<Operation> {
        let mut out: Vec<Diff> = Vec::new();
        for diff in operation.diffs().iter().rev() {
            let semantics = self.semantics_for(&diff.kind)?;
            out.extend(semantics.invert(diff)?);
        }
        Ok(Operation::from_diffs(out))
    }

    /// True when the operation has no observable effect.
    pub fn is_empty(&self, operation: &Operation) -> EstuaryResult<bool> {
        for diff in operation.diffs() {
            if !self.diff_is_empty(diff)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl std::fmt::Debug for Algebra {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<&str> = self.semantics.keys().map(|k| k.as_str()).collect();
        kinds.sort_unstable();
        f.debug_struct("Algebra").field("kinds", &kinds).finish()
    }
}
