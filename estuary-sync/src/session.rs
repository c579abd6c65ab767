//! The client state manager.
//!
//! A session holds three pieces of state: the last commit fully reflected
//! in its projection (`committed_revision`), diffs applied locally but not
//! yet pushed (`pending_local`), and the projection itself. `add` is
//! optimistic and may run while a `sync` is in flight; `sync` is
//! single-flight per session and retries the whole pull → rebase → push
//! sequence on a lost head race.
//!
//! Session state only advances in one step at the end of a successful
//! iteration, so a `sync` future dropped mid-way leaves
//! `pending_local` and `committed_revision` untouched.

use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};
use tracing::{debug, instrument};

use estuary_algebra::Algebra;
use estuary_core::commit::{Commit, CommitId};
use estuary_core::config::SyncConfig;
use estuary_core::diff::{Diff, Operation};
use estuary_core::errors::{EstuaryResult, GraphError, SyncError};
use estuary_core::repo::RepoId;
use estuary_core::traits::{CommitStore, Projection};
use estuary_graph::{GraphWalker, MergeEngine};

/// Outcome of one [`SyncSession::sync`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    /// The head the session is now committed to.
    pub head: CommitId,
    /// Whether a new commit was pushed.
    pub pushed: bool,
    /// How many pull → rebase → push iterations ran.
    pub attempts: u32,
}

struct SessionState<P> {
    committed_revision: CommitId,
    pending_local: Operation,
    projection: P,
}

/// A client session over one repository.
pub struct SyncSession<P: Projection> {
    repo: RepoId,
    store: Arc<dyn CommitStore>,
    algebra: Arc<Algebra>,
    config: SyncConfig,
    state: Mutex<SessionState<P>>,
    flight: tokio::sync::Mutex<()>,
}

impl<P: Projection> SyncSession<P> {
    /// Open a session.
    ///
    /// Ensures the deterministic root commit exists and starts the session
    /// committed to it; the projection must reflect the root (empty)
    /// state. The first `sync` fast-forwards to whatever history the
    /// repository already has.
    pub fn open(
        store: Arc<dyn CommitStore>,
        algebra: Arc<Algebra>,
        config: SyncConfig,
        repo: RepoId,
        projection: P,
    ) -> EstuaryResult<Arc<Self>> {
        let root = Commit::root();
        store.save_commit(&root)?;
        // Seed the head set for a brand-new repository; losing this race
        // just means another writer initialized it first.
        let _ = store.update_heads(
            &repo,
            &BTreeSet::new(),
            &BTreeSet::from([root.id]),
            &BTreeSet::new(),
        )?;
        Ok(Arc::new(Self {
            repo,
            store,
            algebra,
            config,
            state: Mutex::new(SessionState {
                committed_revision: root.id,
                pending_local: Operation::new(),
                projection,
            }),
            flight: tokio::sync::Mutex::new(()),
        }))
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, SessionState<P>> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append a diff to the pending operation and apply it to the
    /// projection immediately. Safe to call while a `sync` is in flight;
    /// such diffs ride along in the next push.
    ///
    /// A diff the projection rejects is not queued — malformed operations
    /// are fatal for that operation, never silently dropped.
    pub fn add(&self, diff: Diff) -> EstuaryResult<()> {
        let mut state = self.lock_state();
        state.projection.apply(&Operation::single(diff.clone()))?;
        state.pending_local.push(diff);
        Ok(())
    }

    /// The commit the projection currently reflects.
    pub fn committed_revision(&self) -> CommitId {
        self.lock_state().committed_revision
    }

    /// Number of diffs waiting to be pushed.
    pub fn pending_len(&self) -> usize {
        self.lock_state().pending_local.len()
    }

    /// Read the projection.
    pub fn with_projection<R>(&self, read: impl FnOnce(&P) -> R) -> R {
        read(&self.lock_state().projection)
    }

    /// Reconcile with the repository: pull the current heads, rebase
    /// pending local diffs over whatever arrived remotely, and push them
    /// as one commit with a compare-and-swap on the head set. A lost swap
    /// re-runs the whole iteration, so a stale rebase is never pushed, up
    /// to the configured attempt budget, after which the race surfaces as
    /// [`SyncError::RaceLost`].
    ///
    /// Calling `sync` again with nothing pending and no remote change is
    /// a no-op.
    #[instrument(skip(self), fields(repo = %self.repo))]
    pub async fn sync(&self) -> EstuaryResult<SyncReport> {
        let _flight = self.flight.lock().await;

        let max_attempts = self.config.max_push_attempts.max(1);
        for attempt in 1..=max_attempts {
            match self.try_sync(attempt)? {
                Some(report) => return Ok(report),
                None => {
                    debug!(attempt, "head race lost, retrying");
                    continue;
                }
            }
        }
        Err(SyncError::RaceLost {
            attempts: max_attempts,
        }
        .into())
    }

    /// One pull → rebase → push iteration. `None` means the head moved
    /// under us and the caller should retry.
    fn try_sync(&self, attempt: u32) -> EstuaryResult<Option<SyncReport>> {
        let heads = self.store.heads(&self.repo)?;

        // Reduce the remote side to a single base commit.
        let base = if heads.is_empty() {
            let root = Commit::root();
            self.store.save_commit(&root)?;
            if !self.store.update_heads(
                &self.repo,
                &BTreeSet::new(),
                &BTreeSet::from([root.id]),
                &BTreeSet::new(),
            )? {
                return Ok(None);
            }
            root.id
        } else if heads.len() > 1 {
            match MergeEngine::merge_heads(&*self.store, &self.algebra, &self.repo, &heads) {
                Ok(head) => head,
                Err(err) if err.is_race_lost() => return Ok(None),
                Err(err) => return Err(err),
            }
        } else {
            // Exactly one element.
            let head = *heads
                .iter()
                .next()
                .ok_or(SyncError::RaceLost { attempts: attempt })?;
            // A head whose ancestors have not all arrived yet is a fetch
            // trigger for the transport, not something to rebase onto.
            if !self.store.is_complete(&head)? {
                return Err(GraphError::IncompleteCommit { id: head.to_hex() }.into());
            }
            head
        };

        // Snapshot local state; diffs added after this point belong to the
        // next epoch and are reconciled at completion.
        let (committed, pending, snapshot_len) = {
            let state = self.lock_state();
            (
                state.committed_revision,
                state.pending_local.clone(),
                state.pending_local.len(),
            )
        };

        // Rebase pending diffs over the remote path. The ancestor case
        // (nothing pending, or no remote movement) degenerates naturally.
        let (rebased_pending, remote_for_projection) = if base == committed {
            (pending.clone(), Operation::new())
        } else {
            let path =
                GraphWalker::path_operation(&*self.store, &self.algebra, &committed, &base)?;
            let t = self.algebra.transform(&pending, &path)?;
            (t.ours, t.theirs)
        };

        let to_push = self.algebra.squash(rebased_pending)?;
        let pushed = !self.algebra.is_empty(&to_push)?;

        let new_head = if pushed {
            let base_commit = self
                .store
                .load_commit(&base)?
                .ok_or_else(|| GraphError::CommitNotFound { id: base.to_hex() })?;
            let mut parents = BTreeMap::new();
            parents.insert(base, to_push);
            let commit = Commit::build(parents, base_commit.level, Utc::now());
            self.store.save_commit(&commit)?;

            if !self.store.update_heads(
                &self.repo,
                &BTreeSet::from([base]),
                &BTreeSet::from([commit.id]),
                &BTreeSet::from([base]),
            )? {
                return Ok(None);
            }
            commit.id
        } else {
            base
        };

        // Commit the new session state in one step: integrate the remote
        // catch-up into the projection, keep only the diffs that arrived
        // mid-flight (rebased onto the new head).
        {
            let mut state = self.lock_state();
            let tail =
                Operation::from_diffs(state.pending_local.diffs()[snapshot_len..].to_vec());
            let t = self.algebra.transform(&tail, &remote_for_projection)?;
            state.projection.apply(&t.theirs)?;
            state.pending_local = t.ours;
            state.committed_revision = new_head;
        }

        debug!(
            head = %new_head.short(),
            pushed,
            attempt,
            "sync complete"
        );
        Ok(Some(SyncReport {
            head: new_head,
            pushed,
            attempts: attempt,
        }))
    }
}
