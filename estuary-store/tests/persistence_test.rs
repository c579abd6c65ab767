//! SQLite durability: state survives close and reopen.

use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};

use estuary_core::{Commit, CommitStore, Diff, DiffKind, Operation, RepoId, Snapshot};
use estuary_store::SqliteStore;

#[test]
fn reopened_database_retains_graph_and_heads() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("estuary.db");
    let repo = RepoId::new("durable");

    let root = Commit::root();
    let mut parents = BTreeMap::new();
    parents.insert(
        root.id,
        Operation::single(Diff::new(
            DiffKind::new("kv.set"),
            serde_json::json!({ "key": "k", "prev": null, "next": "v" }),
            1,
            "tester",
        )),
    );
    let child = Commit::build(parents, root.level, Utc::now());

    {
        let store = SqliteStore::open(&path).unwrap();
        store.save_commit(&root).unwrap();
        store.save_commit(&child).unwrap();
        store
            .update_heads(
                &repo,
                &BTreeSet::new(),
                &[child.id].into_iter().collect(),
                &BTreeSet::new(),
            )
            .unwrap();
        store
            .save_snapshot(&repo, &Snapshot::new(root.id, Operation::new(), Utc::now()))
            .unwrap();
    }

    let store = SqliteStore::open(&path).unwrap();
    assert_eq!(store.load_commit(&child.id).unwrap().unwrap(), child);
    assert!(store.is_complete(&child.id).unwrap());
    assert!(store.heads(&repo).unwrap().contains(&child.id));
    assert_eq!(store.list_snapshots(&repo).unwrap().len(), 1);
    assert!(store.children(&root.id).unwrap().contains(&child.id));
}
