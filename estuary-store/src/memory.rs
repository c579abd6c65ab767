//! In-memory commit store.
//!
//! The reference implementation of the storage contract: mutex-guarded
//! maps, no durability. Completeness is propagated eagerly on save and can
//! be recomputed from the roots with `mark_complete_commits`.

use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use estuary_core::commit::{Commit, CommitId, Snapshot};
use estuary_core::errors::{EstuaryResult, StoreError};
use estuary_core::pull_request::PullRequest;
use estuary_core::repo::RepoId;
use estuary_core::traits::CommitStore;

#[derive(Default)]
struct Inner {
    commits: HashMap<CommitId, Commit>,
    complete: HashSet<CommitId>,
    children: HashMap<CommitId, BTreeSet<CommitId>>,
    heads: HashMap<RepoId, BTreeSet<CommitId>>,
    snapshots: HashMap<RepoId, Vec<Snapshot>>,
    pull_requests: Vec<PullRequest>,
}

impl Inner {
    fn parents_complete(&self, commit: &Commit) -> bool {
        commit
            .parents
            .keys()
            .all(|parent| self.complete.contains(parent))
    }

    /// Flip `id` complete, then cascade forward through any children whose
    /// last missing ancestor just resolved. Returns how many flipped.
    fn complete_forward(&mut self, id: CommitId) -> usize {
        let mut flipped = 0;
        let mut queue = VecDeque::from([id]);
        while let Some(current) = queue.pop_front() {
            if self.complete.contains(&current) {
                continue;
            }
            let ready = self
                .commits
                .get(&current)
                .map(|commit| self.parents_complete(commit))
                .unwrap_or(false);
            if !ready {
                continue;
            }
            self.complete.insert(current);
            flipped += 1;
            if let Some(children) = self.children.get(&current) {
                queue.extend(children.iter().copied());
            }
        }
        flipped
    }
}

/// Mutex-guarded in-memory store.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl CommitStore for MemoryStore {
    fn save_commit(&self, commit: &Commit) -> EstuaryResult<bool> {
        let mut inner = self.lock();
        if inner.commits.contains_key(&commit.id) {
            return Ok(false);
        }
        for parent in commit.parents.keys() {
            inner
                .children
                .entry(*parent)
                .or_default()
                .insert(commit.id);
        }
        inner.commits.insert(commit.id, commit.clone());
        inner.complete_forward(commit.id);
        Ok(true)
    }

    fn load_commit(&self, id: &CommitId) -> EstuaryResult<Option<Commit>> {
        Ok(self.lock().commits.get(id).cloned())
    }

    fn heads(&self, repo: &RepoId) -> EstuaryResult<BTreeSet<CommitId>> {
        Ok(self.lock().heads.get(repo).cloned().unwrap_or_default())
    }

    fn update_heads(
        &self,
        repo: &RepoId,
        expect: &BTreeSet<CommitId>,
        add: &BTreeSet<CommitId>,
        remove: &BTreeSet<CommitId>,
    ) -> EstuaryResult<bool> {
        let mut inner = self.lock();
        let current = inner.heads.entry(repo.clone()).or_default();
        if *current != *expect {
            return Ok(false);
        }
        for id in remove {
            current.remove(id);
        }
        for id in add {
            current.insert(*id);
        }
        Ok(true)
    }

    fn save_snapshot(&self, repo: &RepoId, snapshot: &Snapshot) -> EstuaryResult<()> {
        let mut inner = self.lock();
        let snapshots = inner.snapshots.entry(repo.clone()).or_default();
        if let Some(existing) = snapshots.iter().find(|s| s.commit == snapshot.commit) {
            if existing.operation != snapshot.operation {
                return Err(StoreError::SnapshotImmutable {
                    id: snapshot.commit.to_hex(),
                }
                .into());
            }
            return Ok(());
        }
        snapshots.push(snapshot.clone());
        Ok(())
    }

    fn load_snapshot(
        &self,
        repo: &RepoId,
        commit: &CommitId,
    ) -> EstuaryResult<Option<Snapshot>> {
        Ok(self
            .lock()
            .snapshots
            .get(repo)
            .and_then(|snapshots| snapshots.iter().find(|s| s.commit == *commit))
            .cloned())
    }

    fn list_snapshots(&self, repo: &RepoId) -> EstuaryResult<Vec<Snapshot>> {
        Ok(self.lock().snapshots.get(repo).cloned().unwrap_or_default())
    }

    fn children(&self, id: &CommitId) -> EstuaryResult<BTreeSet<CommitId>> {
        Ok(self.lock().children.get(id).cloned().unwrap_or_default())
    }

    fn is_complete(&self, id: &CommitId) -> EstuaryResult<bool> {
        Ok(self.lock().complete.contains(id))
    }

    fn mark_complete_commits(&self) -> EstuaryResult<usize> {
        let mut inner = self.lock();
        let candidates: Vec<CommitId> = inner
            .commits
            .keys()
            .filter(|id| !inner.complete.contains(*id))
            .copied()
            .collect();
        let mut flipped = 0;
        for id in candidates {
            flipped += inner.complete_forward(id);
        }
        Ok(flipped)
    }

    fn all_commit_ids(&self) -> EstuaryResult<Vec<CommitId>> {
        Ok(self.lock().commits.keys().copied().collect())
    }

    fn delete_commit(&self, id: &CommitId) -> EstuaryResult<bool> {
        let mut inner = self.lock();
        let Some(commit) = inner.commits.remove(id) else {
            return Ok(false);
        };
        for parent in commit.parents.keys() {
            if let Some(children) = inner.children.get_mut(parent) {
                children.remove(id);
            }
        }
        inner.children.remove(id);
        // Descendants keep their completeness flag: it never regresses.
        inner.complete.remove(id);
        Ok(true)
    }

    fn save_pull_request(&self, request: &PullRequest) -> EstuaryResult<()> {
        let mut inner = self.lock();
        inner.pull_requests.retain(|existing| existing.id != request.id);
        inner.pull_requests.push(request.clone());
        Ok(())
    }

    fn live_pull_requests(&self, now: DateTime<Utc>) -> EstuaryResult<Vec<PullRequest>> {
        Ok(self
            .lock()
            .pull_requests
            .iter()
            .filter(|request| request.is_live(now))
            .cloned()
            .collect())
    }
}
