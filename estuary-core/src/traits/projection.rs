//! In-memory projection of a repository's state.

use crate::diff::Operation;
use crate::errors::EstuaryResult;

/// A materialized view a session keeps current by applying operations.
///
/// The engine never interprets diffs itself; the projection understands the
/// diff kinds its application registered and folds them into whatever state
/// shape it maintains.
pub trait Projection: Send {
    /// Fold an operation into the projected state.
    fn apply(&mut self, operation: &Operation) -> EstuaryResult<()>;
}
