//! Background history retention: squash old history into snapshots and
//! prune commits no live head can reach.
//!
//! Retention is best-effort: a failed pass is logged and retried on the
//! next tick. Unbounded history growth costs storage, never correctness.

use chrono::{Duration, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use estuary_algebra::Algebra;
use estuary_core::commit::{Commit, CommitId, Snapshot};
use estuary_core::config::RetentionConfig;
use estuary_core::diff::Operation;
use estuary_core::errors::{EstuaryError, EstuaryResult, GraphError};
use estuary_core::repo::RepoId;
use estuary_core::traits::CommitStore;
use estuary_graph::GraphWalker;

/// What one retention pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetentionReport {
    /// Commit a new snapshot was written for, if any.
    pub snapshot: Option<CommitId>,
    /// Commits pruned from the store.
    pub deleted: usize,
}

/// Periodic compaction of one repository's history.
pub struct RetentionController {
    store: Arc<dyn CommitStore>,
    algebra: Arc<Algebra>,
    config: RetentionConfig,
    repo: RepoId,
}

impl RetentionController {
    /// Create a controller; nothing runs until [`run_once`] or [`spawn`].
    ///
    /// [`run_once`]: RetentionController::run_once
    /// [`spawn`]: RetentionController::spawn
    pub fn new(
        store: Arc<dyn CommitStore>,
        algebra: Arc<Algebra>,
        config: RetentionConfig,
        repo: RepoId,
    ) -> Self {
        Self {
            store,
            algebra,
            config,
            repo,
        }
    }

    /// One retention pass.
    ///
    /// Picks the newest complete non-head commit that is at least
    /// `extra_snapshots_count` commits behind every live head or older
    /// than `freeze_timeout_secs`, snapshots the previous-snapshot→commit
    /// squash, then deletes commits strictly older than the snapshot that
    /// no live head, un-expired pull request, or existing snapshot pins.
    #[instrument(skip(self), fields(repo = %self.repo))]
    pub fn run_once(&self) -> EstuaryResult<RetentionReport> {
        let now = Utc::now();
        let heads = self.store.heads(&self.repo)?;
        if heads.is_empty() {
            return Ok(RetentionReport::default());
        }

        let mut min_head_level = u32::MAX;
        for head in &heads {
            if let Some(commit) = self.store.load_commit(head)? {
                min_head_level = min_head_level.min(commit.level);
            }
        }
        let reachable = GraphWalker::reachable_from(&*self.store, &heads)?;

        let freeze = Duration::seconds(self.config.freeze_timeout_secs as i64);
        let mut candidate: Option<(u32, CommitId)> = None;
        for id in &reachable {
            if heads.contains(id) {
                continue;
            }
            let Some(commit) = self.store.load_commit(id)? else {
                continue;
            };
            if commit.is_root() || !self.store.is_complete(id)? {
                continue;
            }
            let commits_behind = u64::from(min_head_level.saturating_sub(commit.level));
            let frozen = now.signed_duration_since(commit.timestamp) > freeze;
            if commits_behind < self.config.extra_snapshots_count && !frozen {
                continue;
            }
            if candidate
                .map(|current| (commit.level, *id) > current)
                .unwrap_or(true)
            {
                candidate = Some((commit.level, *id));
            }
        }
        let Some((snapshot_level, snapshot_commit)) = candidate else {
            return Ok(RetentionReport::default());
        };

        let snapshot = if self
            .store
            .load_snapshot(&self.repo, &snapshot_commit)?
            .is_none()
        {
            let operation = self.operation_since_previous_snapshot(&snapshot_commit)?;
            self.store.save_snapshot(
                &self.repo,
                &Snapshot::new(snapshot_commit, operation, now),
            )?;
            Some(snapshot_commit)
        } else {
            None
        };

        // Pin everything a live head reaches, everything an un-expired
        // pull request reaches, and every snapshotted commit.
        let mut pinned = reachable;
        for request in self.store.live_pull_requests(now)? {
            let pr_heads = BTreeSet::from([request.head]);
            pinned.extend(GraphWalker::reachable_from(&*self.store, &pr_heads)?);
        }
        for existing in self.store.list_snapshots(&self.repo)? {
            pinned.insert(existing.commit);
        }

        let mut deleted = 0;
        for id in self.store.all_commit_ids()? {
            if pinned.contains(&id) {
                continue;
            }
            let Some(commit) = self.store.load_commit(&id)? else {
                continue;
            };
            if commit.level < snapshot_level && self.store.delete_commit(&id)? {
                deleted += 1;
            }
        }

        debug!(
            snapshot = ?snapshot.map(|id| id.short()),
            deleted,
            "retention pass complete"
        );
        Ok(RetentionReport { snapshot, deleted })
    }

    /// The root→commit operation, replayed from the latest snapshot that
    /// is an ancestor of `commit` to keep the squash bounded.
    fn operation_since_previous_snapshot(
        &self,
        commit: &CommitId,
    ) -> EstuaryResult<Operation> {
        let snapshots = self.store.list_snapshots(&self.repo)?;
        for previous in snapshots.iter().rev() {
            match GraphWalker::path_operation(
                &*self.store,
                &self.algebra,
                &previous.commit,
                commit,
            ) {
                Ok(path) => {
                    let mut operation = previous.operation.clone();
                    operation.extend(path);
                    return self.algebra.squash(operation);
                }
                Err(EstuaryError::GraphError(
                    GraphError::NoPath { .. } | GraphError::CommitNotFound { .. },
                )) => continue,
                Err(err) => return Err(err),
            }
        }
        let root = Commit::root();
        GraphWalker::path_operation(&*self.store, &self.algebra, &root.id, commit)
    }

    /// Run `run_once` on a fixed interval until the returned handle is
    /// dropped or aborted. Failures are logged and retried on the next
    /// tick. A disabled config spawns nothing.
    pub fn spawn(self) -> RetentionHandle {
        if !self.config.enabled {
            return RetentionHandle { task: None };
        }
        let period = std::time::Duration::from_secs(self.config.interval_secs.max(1));
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match self.run_once() {
                    Ok(report) => {
                        if report.snapshot.is_some() || report.deleted > 0 {
                            debug!(deleted = report.deleted, "scheduled retention pass");
                        }
                    }
                    Err(err) => warn!(error = %err, "retention pass failed; retrying next tick"),
                }
            }
        });
        RetentionHandle { task: Some(task) }
    }
}

/// Aborts the scheduled retention task when dropped.
pub struct RetentionHandle {
    task: Option<tokio::task::JoinHandle<()>>,
}

impl RetentionHandle {
    /// Stop the scheduled task now.
    pub fn abort(&self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}

impl Drop for RetentionHandle {
    fn drop(&mut self) {
        self.abort();
    }
}
