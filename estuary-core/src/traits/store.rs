//! The persistence contract the engine requires.
//!
//! Any storage satisfying this — in-memory, SQLite, or a remote node
//! reached over a network client — is interchangeable. The engine adds no
//! locking of its own beyond the compare-and-swap contract on heads;
//! individual operations must be atomic at the storage layer.

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

use crate::commit::{Commit, CommitId, Snapshot};
use crate::errors::EstuaryResult;
use crate::pull_request::PullRequest;
use crate::repo::RepoId;

/// Commit-graph storage. Commits are write-once and content-addressed;
/// heads are the only mutable state, guarded by compare-and-swap.
pub trait CommitStore: Send + Sync {
    /// Persist a commit. Returns `false` when the id already exists —
    /// commits are write-once, so a repeated save is a no-op.
    fn save_commit(&self, commit: &Commit) -> EstuaryResult<bool>;

    /// Load a commit by id.
    fn load_commit(&self, id: &CommitId) -> EstuaryResult<Option<Commit>>;

    /// Current head set of a repository. Multiple concurrent heads are
    /// normal; they are merged before producing a single state.
    fn heads(&self, repo: &RepoId) -> EstuaryResult<BTreeSet<CommitId>>;

    /// Atomically replace heads: succeeds only while the stored head set
    /// still equals `expect` (compare-and-swap). `add` joins the set,
    /// `remove` leaves it. Returns `false` on a lost race.
    fn update_heads(
        &self,
        repo: &RepoId,
        expect: &BTreeSet<CommitId>,
        add: &BTreeSet<CommitId>,
        remove: &BTreeSet<CommitId>,
    ) -> EstuaryResult<bool>;

    /// Persist a snapshot. Snapshots are immutable: re-saving the same
    /// commit with different contents is a [`StoreError::SnapshotImmutable`]
    /// error.
    ///
    /// [`StoreError::SnapshotImmutable`]: crate::errors::StoreError::SnapshotImmutable
    fn save_snapshot(&self, repo: &RepoId, snapshot: &Snapshot) -> EstuaryResult<()>;

    /// Load the snapshot for a commit, if one was taken.
    fn load_snapshot(&self, repo: &RepoId, commit: &CommitId)
        -> EstuaryResult<Option<Snapshot>>;

    /// All snapshots of a repository, oldest first.
    fn list_snapshots(&self, repo: &RepoId) -> EstuaryResult<Vec<Snapshot>>;

    /// Ids of the commits that name `id` as a parent.
    fn children(&self, id: &CommitId) -> EstuaryResult<BTreeSet<CommitId>>;

    /// Completeness flag: true iff the commit and all its ancestors are
    /// present locally. Incomplete commits are excluded from merge and
    /// LCA computation.
    fn is_complete(&self, id: &CommitId) -> EstuaryResult<bool>;

    /// Recompute completeness forward from the roots, flipping commits to
    /// complete as their last missing ancestor arrives. Returns how many
    /// commits were newly marked. Call after receiving commits out of
    /// order. Monotone: never clears an existing flag.
    fn mark_complete_commits(&self) -> EstuaryResult<usize>;

    /// Every commit id in the store. Used by retention to find
    /// unreachable history.
    fn all_commit_ids(&self) -> EstuaryResult<Vec<CommitId>>;

    /// Remove a commit. Retention only; returns `false` when absent.
    fn delete_commit(&self, id: &CommitId) -> EstuaryResult<bool>;

    /// Record an advisory pull request.
    fn save_pull_request(&self, request: &PullRequest) -> EstuaryResult<()>;

    /// Pull requests that have not expired as of `now`.
    fn live_pull_requests(&self, now: DateTime<Utc>) -> EstuaryResult<Vec<PullRequest>>;
}
