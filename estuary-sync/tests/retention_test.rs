//! Retention windows: snapshot eligibility, pruning, and pinning.

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use estuary_algebra::{kv, Algebra, KvSemantics, KvState};
use estuary_core::{
    Commit, CommitId, CommitStore, Operation, Projection, PullRequest, RepoId, RetentionConfig,
    Snapshot, TieBreak,
};
use estuary_graph::GraphWalker;
use estuary_store::MemoryStore;
use estuary_sync::RetentionController;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("estuary_sync=debug")
        .with_test_writer()
        .try_init();
}

fn algebra() -> Arc<Algebra> {
    Arc::new(
        Algebra::builder()
            .register(kv::kind(), KvSemantics::new(TieBreak::Conflict))
            .build(),
    )
}

fn repo() -> RepoId {
    RepoId::new("retention-test")
}

fn commit_at(
    store: &dyn CommitStore,
    parent: &Commit,
    key: &str,
    next: &str,
    seq: u64,
    when: DateTime<Utc>,
) -> Commit {
    let mut parents = BTreeMap::new();
    parents.insert(
        parent.id,
        Operation::single(kv::set(key, Value::Null, next, seq, "writer")),
    );
    let commit = Commit::build(parents, parent.level, when);
    store.save_commit(&commit).unwrap();
    commit
}

fn set_heads(store: &dyn CommitStore, ids: &[CommitId]) {
    let current = store.heads(&repo()).unwrap();
    let add: BTreeSet<CommitId> = ids.iter().copied().collect();
    assert!(store.update_heads(&repo(), &current, &add, &current).unwrap());
}

/// root ← a ← b ← c ← d(head), all commit timestamps at `when`.
fn chain(store: &dyn CommitStore, when: DateTime<Utc>) -> [Commit; 5] {
    let root = Commit::root();
    store.save_commit(&root).unwrap();
    let a = commit_at(store, &root, "a", "1", 1, when);
    let b = commit_at(store, &a, "b", "2", 2, when);
    let c = commit_at(store, &b, "c", "3", 3, when);
    let d = commit_at(store, &c, "d", "4", 4, when);
    set_heads(store, &[d.id]);
    [root, a, b, c, d]
}

fn controller(store: &Arc<MemoryStore>, config: RetentionConfig) -> RetentionController {
    RetentionController::new(store.clone(), algebra(), config, repo())
}

#[test]
fn short_history_inside_the_window_is_retained() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let commits = chain(&*store, Utc::now());

    // A snapshot already exists partway up the chain.
    let snapshot_op =
        GraphWalker::path_operation(&*store, &algebra(), &commits[0].id, &commits[3].id)
            .unwrap();
    store
        .save_snapshot(&repo(), &Snapshot::new(commits[3].id, snapshot_op, Utc::now()))
        .unwrap();

    // Default window: 1000 commits behind, day-long freeze. Nothing
    // qualifies; every commit survives.
    let report = controller(&store, RetentionConfig::default())
        .run_once()
        .unwrap();
    assert_eq!(report.snapshot, None);
    assert_eq!(report.deleted, 0);
    for commit in &commits {
        assert!(store.load_commit(&commit.id).unwrap().is_some());
    }
    assert_eq!(store.list_snapshots(&repo()).unwrap().len(), 1);
}

#[test]
fn tiny_freeze_timeout_squashes_history_below_the_head() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let commits = chain(&*store, Utc::now() - Duration::hours(2));

    let config = RetentionConfig {
        freeze_timeout_secs: 1,
        ..RetentionConfig::default()
    };
    let report = controller(&store, config).run_once().unwrap();

    // The newest frozen non-head commit got the snapshot; the head stays
    // live and nothing reachable was deleted.
    assert_eq!(report.snapshot, Some(commits[3].id));
    assert_eq!(report.deleted, 0);
    for commit in &commits {
        assert!(store.load_commit(&commit.id).unwrap().is_some());
    }

    // The snapshot replays to the same state as the full chain.
    let snapshot = store
        .load_snapshot(&repo(), &commits[3].id)
        .unwrap()
        .unwrap();
    let mut from_snapshot = KvState::new();
    from_snapshot.apply(&snapshot.operation).unwrap();
    let replayed =
        GraphWalker::path_operation(&*store, &algebra(), &commits[0].id, &commits[3].id)
            .unwrap();
    let mut from_history = KvState::new();
    from_history.apply(&replayed).unwrap();
    assert_eq!(from_snapshot, from_history);
}

#[test]
fn unreachable_commits_below_the_snapshot_are_pruned() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let old = Utc::now() - Duration::hours(2);
    let commits = chain(&*store, old);

    // An abandoned push: saved, never became a head.
    let orphan = commit_at(&*store, &commits[0], "orphan", "x", 9, old);

    let config = RetentionConfig {
        freeze_timeout_secs: 1,
        ..RetentionConfig::default()
    };
    let report = controller(&store, config).run_once().unwrap();

    assert_eq!(report.snapshot, Some(commits[3].id));
    assert_eq!(report.deleted, 1);
    assert!(store.load_commit(&orphan.id).unwrap().is_none());
    // Everything the head reaches is still there.
    for commit in &commits {
        assert!(store.load_commit(&commit.id).unwrap().is_some());
    }
}

#[test]
fn live_pull_requests_pin_their_commits() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let old = Utc::now() - Duration::hours(2);
    let commits = chain(&*store, old);

    let pinned_orphan = commit_at(&*store, &commits[0], "pinned", "x", 8, old);
    let doomed_orphan = commit_at(&*store, &commits[0], "doomed", "y", 9, old);

    store
        .save_pull_request(&PullRequest::new(
            RepoId::new("elsewhere"),
            repo(),
            pinned_orphan.id,
            vec![0xAB],
            Utc::now() + Duration::hours(1),
        ))
        .unwrap();

    let config = RetentionConfig {
        freeze_timeout_secs: 1,
        ..RetentionConfig::default()
    };
    let report = controller(&store, config).run_once().unwrap();

    assert_eq!(report.deleted, 1);
    assert!(store.load_commit(&pinned_orphan.id).unwrap().is_some());
    assert!(store.load_commit(&doomed_orphan.id).unwrap().is_none());
}

#[test]
fn empty_repository_is_a_quiet_no_op() {
    let store = Arc::new(MemoryStore::new());
    let report = controller(&store, RetentionConfig::default())
        .run_once()
        .unwrap();
    assert_eq!(report, estuary_sync::RetentionReport::default());
}

#[tokio::test(start_paused = true)]
async fn scheduled_passes_run_until_the_handle_drops() {
    let store = Arc::new(MemoryStore::new());
    let old = Utc::now() - Duration::hours(2);
    let commits = chain(&*store, old);

    let config = RetentionConfig {
        freeze_timeout_secs: 1,
        interval_secs: 60,
        ..RetentionConfig::default()
    };
    let handle = controller(&store, config).spawn();

    // The first tick fires immediately; give the task a turn.
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    assert_eq!(
        store
            .load_snapshot(&repo(), &commits[3].id)
            .unwrap()
            .map(|s| s.commit),
        Some(commits[3].id)
    );
    drop(handle);
}
