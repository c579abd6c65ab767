//! Contract tests run against both store implementations: the engine
//! cannot tell them apart.

use chrono::{Duration, Utc};
use std::collections::{BTreeMap, BTreeSet};

use estuary_core::{
    Commit, CommitId, CommitStore, Diff, DiffKind, Operation, PullRequest, RepoId, Snapshot,
};
use estuary_store::{MemoryStore, SqliteStore};

fn op(tag: &str) -> Operation {
    Operation::single(Diff::new(
        DiffKind::new("kv.set"),
        serde_json::json!({ "key": "k", "prev": null, "next": tag }),
        1,
        "tester",
    ))
}

fn child_of(parent: &Commit, tag: &str) -> Commit {
    let mut parents = BTreeMap::new();
    parents.insert(parent.id, op(tag));
    Commit::build(parents, parent.level, Utc::now())
}

fn set_of(ids: &[CommitId]) -> BTreeSet<CommitId> {
    ids.iter().copied().collect()
}

fn contract_suite(store: &dyn CommitStore) {
    let repo = RepoId::new("contract");

    // Commits are write-once.
    let root = Commit::root();
    assert!(store.save_commit(&root).unwrap());
    assert!(!store.save_commit(&root).unwrap());
    assert_eq!(store.load_commit(&root.id).unwrap().unwrap(), root);

    // Roots are complete immediately; children become complete eagerly.
    assert!(store.is_complete(&root.id).unwrap());
    let a = child_of(&root, "a");
    assert!(store.save_commit(&a).unwrap());
    assert!(store.is_complete(&a.id).unwrap());

    // Children index.
    assert!(store.children(&root.id).unwrap().contains(&a.id));

    // Out-of-order arrival: a grandchild saved before its parent stays
    // pending until the gap fills, then completes.
    let b = child_of(&a, "b");
    let c = child_of(&b, "c");
    assert!(store.save_commit(&c).unwrap());
    assert!(!store.is_complete(&c.id).unwrap());
    assert!(store.save_commit(&b).unwrap());
    assert!(store.is_complete(&b.id).unwrap());
    assert!(store.is_complete(&c.id).unwrap());

    // Completeness is monotone across recomputation.
    store.mark_complete_commits().unwrap();
    for id in [root.id, a.id, b.id, c.id] {
        assert!(store.is_complete(&id).unwrap());
    }

    // Head compare-and-swap.
    assert!(store
        .update_heads(&repo, &BTreeSet::new(), &set_of(&[root.id]), &BTreeSet::new())
        .unwrap());
    assert_eq!(store.heads(&repo).unwrap(), set_of(&[root.id]));
    // Stale expectation loses the race.
    assert!(!store
        .update_heads(&repo, &BTreeSet::new(), &set_of(&[a.id]), &BTreeSet::new())
        .unwrap());
    assert!(store
        .update_heads(&repo, &set_of(&[root.id]), &set_of(&[c.id]), &set_of(&[root.id]))
        .unwrap());
    assert_eq!(store.heads(&repo).unwrap(), set_of(&[c.id]));

    // Snapshots are immutable once written.
    let snapshot = Snapshot::new(a.id, op("a"), Utc::now());
    store.save_snapshot(&repo, &snapshot).unwrap();
    store.save_snapshot(&repo, &snapshot).unwrap();
    let altered = Snapshot::new(a.id, op("different"), Utc::now());
    assert!(store.save_snapshot(&repo, &altered).is_err());
    assert_eq!(
        store.load_snapshot(&repo, &a.id).unwrap().unwrap().operation,
        snapshot.operation
    );
    assert_eq!(store.list_snapshots(&repo).unwrap().len(), 1);

    // Pull requests filter on expiry.
    let now = Utc::now();
    let live = PullRequest::new(
        RepoId::new("other"),
        repo.clone(),
        c.id,
        vec![1, 2, 3],
        now + Duration::hours(1),
    );
    let expired = PullRequest::new(
        RepoId::new("other"),
        repo.clone(),
        b.id,
        vec![],
        now - Duration::hours(1),
    );
    store.save_pull_request(&live).unwrap();
    store.save_pull_request(&expired).unwrap();
    let pending = store.live_pull_requests(now).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, live.id);

    // Deletion.
    assert_eq!(store.all_commit_ids().unwrap().len(), 4);
    assert!(store.delete_commit(&root.id).unwrap());
    assert!(!store.delete_commit(&root.id).unwrap());
    assert!(store.load_commit(&root.id).unwrap().is_none());
    // Descendants never lose their completeness flag.
    assert!(store.is_complete(&a.id).unwrap());
}

#[test]
fn memory_store_satisfies_contract() {
    contract_suite(&MemoryStore::new());
}

#[test]
fn sqlite_store_satisfies_contract() {
    contract_suite(&SqliteStore::open_in_memory().unwrap());
}
