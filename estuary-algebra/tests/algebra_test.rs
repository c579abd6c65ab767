//! Diff-algebra behavior: last-writer-wins transform, tie policies,
//! squash folding, inversion, and composite propagation.

use std::collections::BTreeMap;

use serde_json::Value;

use estuary_algebra::{composite, kv, Algebra, CompositeSemantics, KvSemantics};
use estuary_core::{Diff, DiffKind, Operation, TieBreak};

fn kv_algebra(tie_break: TieBreak) -> Algebra {
    Algebra::builder()
        .register(kv::kind(), KvSemantics::new(tie_break))
        .build()
}

#[test]
fn later_timestamp_wins_transform() {
    let algebra = kv_algebra(TieBreak::Conflict);
    let ours = kv::set("name", Value::Null, "Alice", 7, "s1");
    let theirs = kv::set("name", Value::Null, "Bob", 3, "s2");

    let t = algebra.transform_diffs(&ours, &theirs).unwrap();
    // We win: nothing to apply on our side, their side adopts "Alice".
    assert!(t.theirs.is_empty());
    assert_eq!(t.ours.len(), 1);
    let catch_up: kv::KvPayload = serde_json::from_value(t.ours[0].payload.clone()).unwrap();
    assert_eq!(catch_up.next, Value::String("Alice".to_string()));
}

#[test]
fn identical_writes_converge_without_catch_up() {
    let algebra = kv_algebra(TieBreak::Conflict);
    let ours = kv::set("name", Value::Null, "Alice", 5, "s1");
    let theirs = kv::set("name", Value::Null, "Alice", 9, "s2");

    let t = algebra.transform_diffs(&ours, &theirs).unwrap();
    assert!(t.ours.is_empty());
    assert!(t.theirs.is_empty());
}

#[test]
fn equal_timestamps_surface_conflict_by_default() {
    let algebra = kv_algebra(TieBreak::Conflict);
    let ours = kv::set("name", Value::Null, "Alice", 5, "s1");
    let theirs = kv::set("name", Value::Null, "Bob", 5, "s2");

    let err = algebra.transform_diffs(&ours, &theirs).unwrap_err();
    assert!(err.is_conflict(), "got: {err}");
}

#[test]
fn equal_timestamps_resolve_by_actor_when_opted_in() {
    let algebra = kv_algebra(TieBreak::ByActor);
    let ours = kv::set("name", Value::Null, "Alice", 5, "s1");
    let theirs = kv::set("name", Value::Null, "Bob", 5, "s2");

    // "s2" > "s1": their write wins, our side adopts "Bob".
    let t = algebra.transform_diffs(&ours, &theirs).unwrap();
    assert!(t.ours.is_empty());
    assert_eq!(t.theirs.len(), 1);
}

#[test]
fn disjoint_keys_pass_through_unchanged() {
    let algebra = kv_algebra(TieBreak::Conflict);
    let ours = kv::set("name", Value::Null, "Alice", 5, "s1");
    let theirs = kv::set("city", Value::Null, "Aveiro", 5, "s2");

    let t = algebra.transform_diffs(&ours, &theirs).unwrap();
    assert_eq!(t.ours, vec![ours]);
    assert_eq!(t.theirs, vec![theirs]);
}

#[test]
fn empty_diffs_transform_without_conflict() {
    let algebra = kv_algebra(TieBreak::Conflict);
    let ours = kv::set("name", "same", "same", 5, "s1");
    let theirs = kv::set("name", "same", "same", 5, "s2");

    let t = algebra.transform_diffs(&ours, &theirs).unwrap();
    for diff in t.ours.iter().chain(t.theirs.iter()) {
        assert!(algebra.diff_is_empty(diff).unwrap());
    }
}

#[test]
fn squash_folds_same_key_runs() {
    let algebra = kv_algebra(TieBreak::Conflict);
    let op = Operation::from_diffs(vec![
        kv::set("name", Value::Null, "Ada", 1, "s1"),
        kv::set("name", "Ada", "Ada L.", 2, "s1"),
        kv::set("city", Value::Null, "London", 3, "s1"),
    ]);

    let squashed = algebra.squash(op).unwrap();
    assert_eq!(squashed.len(), 2);
    let first: kv::KvPayload =
        serde_json::from_value(squashed.diffs()[0].payload.clone()).unwrap();
    assert_eq!(first.prev, Value::Null);
    assert_eq!(first.next, Value::String("Ada L.".to_string()));
}

#[test]
fn squash_drops_no_op_diffs() {
    let algebra = kv_algebra(TieBreak::Conflict);
    let op = Operation::from_diffs(vec![
        kv::set("name", "x", "x", 1, "s1"),
        kv::set("city", Value::Null, "Porto", 2, "s1"),
    ]);
    let squashed = algebra.squash(op).unwrap();
    assert_eq!(squashed.len(), 1);
}

#[test]
fn operation_annihilates_against_its_inverse() {
    let algebra = kv_algebra(TieBreak::Conflict);
    let op = Operation::from_diffs(vec![
        kv::set("a", Value::Null, "1", 1, "s1"),
        kv::set("b", Value::Null, "2", 2, "s1"),
        kv::set("a", "1", "3", 3, "s1"),
    ]);

    let inverse = algebra.invert(&op).unwrap();
    let mut round_trip = op;
    round_trip.extend(inverse);
    let squashed = algebra.squash(round_trip).unwrap();
    assert!(
        algebra.is_empty(&squashed).unwrap(),
        "leftover: {squashed:?}"
    );
}

#[test]
fn unknown_kind_is_rejected() {
    let algebra = kv_algebra(TieBreak::Conflict);
    let stray = Diff::new(DiffKind::new("bogus"), Value::Null, 1, "s1");
    let err = algebra
        .transform_diffs(&stray, &kv::set("k", Value::Null, "v", 1, "s2"))
        .unwrap_err();
    assert!(err.to_string().contains("bogus"), "got: {err}");
}

fn composite_algebra() -> Algebra {
    let fields = kv_algebra(TieBreak::Conflict);
    Algebra::builder()
        .register(
            composite::kind(),
            CompositeSemantics::builder()
                .component("fields", fields)
                .build(),
        )
        .build()
}

fn composite_set(key: &str, next: &str, timestamp: u64, actor: &str) -> Diff {
    let mut components = BTreeMap::new();
    components.insert(
        "fields".to_string(),
        vec![kv::set(key, Value::Null, next, timestamp, actor)],
    );
    composite::wrap(components, timestamp, actor)
}

#[test]
fn composite_transforms_component_wise() {
    let algebra = composite_algebra();
    let ours = composite_set("name", "Alice", 7, "s1");
    let theirs = composite_set("city", "Faro", 3, "s2");

    let t = algebra.transform_diffs(&ours, &theirs).unwrap();
    // Disjoint keys inside the component: both sides keep one catch-up
    // composite carrying the other side's change.
    assert_eq!(t.ours.len(), 1);
    assert_eq!(t.theirs.len(), 1);
}

#[test]
fn composite_conflict_poisons_whole_operation() {
    let algebra = composite_algebra();
    let ours = composite_set("name", "Alice", 5, "s1");
    let theirs = composite_set("name", "Bob", 5, "s2");

    let err = algebra.transform_diffs(&ours, &theirs).unwrap_err();
    assert!(err.is_conflict(), "got: {err}");
}

#[test]
fn composite_inverts_and_annihilates() {
    let algebra = composite_algebra();
    let diff = composite_set("name", "Alice", 5, "s1");
    let op = Operation::single(diff);

    let inverse = algebra.invert(&op).unwrap();
    let mut round_trip = op;
    round_trip.extend(inverse);
    let squashed = algebra.squash(round_trip).unwrap();
    assert!(algebra.is_empty(&squashed).unwrap());
}
