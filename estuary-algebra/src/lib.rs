//! # estuary-algebra
//!
//! The diff algebra: per-kind transform / invert / squash / empty-predicate
//! functions, composable into operation-level reconciliation and into
//! merged algebras over tuple-shaped diffs.

pub mod algebra;
pub mod composite;
pub mod kv;
pub mod semantics;

pub use algebra::{Algebra, AlgebraBuilder, TransformedOps};
pub use composite::CompositeSemantics;
pub use kv::{KvSemantics, KvState};
pub use semantics::{DiffSemantics, Transformed};
