//! The per-kind algebra contract.

use estuary_core::diff::Diff;
use estuary_core::errors::AlgebraError;

/// Result of transforming two concurrent diffs applied to the same base
/// state.
///
/// Diamond property: applying the original `ours` followed by
/// `Transformed::theirs` reaches the same state as applying the original
/// `theirs` followed by `Transformed::ours`.
#[derive(Debug, Clone, PartialEq)]
pub struct Transformed {
    /// `ours`, rebased to apply on top of `theirs`.
    pub ours: Vec<Diff>,
    /// `theirs`, rebased to apply on top of `ours`.
    pub theirs: Vec<Diff>,
}

impl Transformed {
    /// Both sides unchanged — the diffs are independent.
    pub fn unchanged(ours: &Diff, theirs: &Diff) -> Self {
        Self {
            ours: vec![ours.clone()],
            theirs: vec![theirs.clone()],
        }
    }

    /// Both sides already converged — nothing left to apply.
    pub fn converged() -> Self {
        Self {
            ours: Vec::new(),
            theirs: Vec::new(),
        }
    }
}

/// The four algebra functions a diff kind registers.
///
/// Implementations must uphold two laws, property-tested in this crate:
/// the diamond property of [`transform`](DiffSemantics::transform), and the
/// invert law — squashing `[a, invert(a)]` yields an empty operation.
/// Returned diff lists are final: the engine never re-transforms the two
/// sides of one [`Transformed`] against each other.
pub trait DiffSemantics: Send + Sync {
    /// Reconcile two concurrent diffs of this kind.
    fn transform(&self, ours: &Diff, theirs: &Diff) -> Result<Transformed, AlgebraError>;

    /// Diffs that undo `diff`.
    fn invert(&self, diff: &Diff) -> Result<Vec<Diff>, AlgebraError>;

    /// Compact two adjacent diffs of this kind into one, when possible.
    /// `None` means the pair does not fold.
    fn squash_pair(&self, first: &Diff, second: &Diff)
        -> Result<Option<Diff>, AlgebraError>;

    /// True when the diff has no observable effect.
    fn is_empty(&self, diff: &Diff) -> bool;
}
