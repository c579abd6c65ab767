//! Algebra laws, property-tested over random key-value operations.

use std::collections::BTreeMap;

use proptest::prelude::*;
use serde_json::Value;

use estuary_algebra::{kv, Algebra, KvSemantics, KvState};
use estuary_core::{Operation, Projection, TieBreak};

fn algebra() -> Algebra {
    // ByActor keeps every pair resolvable so convergence can be checked
    // across arbitrary generated inputs; the Conflict policy is covered by
    // the unit tests.
    Algebra::builder()
        .register(kv::kind(), KvSemantics::new(TieBreak::ByActor))
        .build()
}

/// A sequentially coherent operation: each diff's `prev` is the value the
/// preceding diffs left behind for that key.
fn arb_operation(actor: &'static str) -> impl Strategy<Value = Operation> {
    prop::collection::vec(("[abc]", "[a-z]{1,4}", 0u64..16), 0..5).prop_map(move |writes| {
        let mut current: BTreeMap<String, Value> = BTreeMap::new();
        let mut diffs = Vec::new();
        for (key, value, timestamp) in writes {
            let prev = current.get(&key).cloned().unwrap_or(Value::Null);
            let next = Value::String(value);
            current.insert(key.clone(), next.clone());
            diffs.push(kv::set(&key, prev, next, timestamp, actor));
        }
        Operation::from_diffs(diffs)
    })
}

fn state_after(base: &KvState, operations: &[&Operation]) -> KvState {
    let mut state = base.clone();
    for operation in operations {
        state.apply(operation).unwrap();
    }
    state
}

proptest! {
    /// Diamond law: ours + transformed-theirs converges with
    /// theirs + transformed-ours.
    #[test]
    fn transform_converges(ours in arb_operation("s1"), theirs in arb_operation("s2")) {
        let algebra = algebra();
        let base = KvState::new();

        let t = algebra.transform(&ours, &theirs).unwrap();
        let via_ours = state_after(&base, &[&ours, &t.theirs]);
        let via_theirs = state_after(&base, &[&theirs, &t.ours]);
        prop_assert_eq!(via_ours, via_theirs);
    }

    /// Invert law: an operation squashed against its own inverse is empty.
    #[test]
    fn invert_annihilates(op in arb_operation("s1")) {
        let algebra = algebra();
        let inverse = algebra.invert(&op).unwrap();
        let mut round_trip = op;
        round_trip.extend(inverse);
        let squashed = algebra.squash(round_trip).unwrap();
        prop_assert!(algebra.is_empty(&squashed).unwrap());
    }

    /// Squash never grows an operation and preserves its effect.
    #[test]
    fn squash_shrinks_and_preserves_effect(op in arb_operation("s1")) {
        let algebra = algebra();
        let squashed = algebra.squash(op.clone()).unwrap();
        prop_assert!(squashed.len() <= op.len());

        let full = state_after(&KvState::new(), &[&op]);
        let compact = state_after(&KvState::new(), &[&squashed]);
        prop_assert_eq!(full, compact);
    }

    /// Transforming against an empty operation changes nothing.
    #[test]
    fn empty_operation_is_neutral(op in arb_operation("s1")) {
        let algebra = algebra();
        let t = algebra.transform(&op, &Operation::new()).unwrap();
        prop_assert_eq!(t.ours, op);
        prop_assert!(t.theirs.is_empty());
    }
}
