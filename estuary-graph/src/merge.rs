//! The merge engine: reduce divergent heads to one consistent commit.
//!
//! Pairwise transform over the per-head catch-up operations, folded with
//! squash. Reduction order does not affect the merged state (the algebra
//! laws guarantee it), though it may change which conflict surfaces first.
//! A conflict aborts the whole merge before anything is written.

use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, instrument};

use estuary_algebra::Algebra;
use estuary_core::commit::{Commit, CommitId};
use estuary_core::diff::Operation;
use estuary_core::errors::{EstuaryResult, GraphError, SyncError};
use estuary_core::repo::RepoId;
use estuary_core::traits::CommitStore;

use crate::walker::GraphWalker;

/// Stateless merge orchestrator.
pub struct MergeEngine;

impl MergeEngine {
    /// Reduce the given head set to a single head.
    ///
    /// Incomplete heads are excluded from the reduction and left in place;
    /// a lone complete head is returned as-is. Otherwise one merge commit
    /// is created whose parents are exactly the merged heads, each edge
    /// labeled with that head's catch-up operation, and the head set is
    /// swapped by compare-and-swap against `heads` — the exact set the
    /// caller read. A lost swap surfaces as a race for the caller to
    /// retry.
    #[instrument(skip(store, algebra, heads), fields(repo = %repo, heads = heads.len()))]
    pub fn merge_heads(
        store: &dyn CommitStore,
        algebra: &Algebra,
        repo: &RepoId,
        heads: &BTreeSet<CommitId>,
    ) -> EstuaryResult<CommitId> {
        if heads.is_empty() {
            return Err(GraphError::EmptyHeadSet {
                repo: repo.to_string(),
            }
            .into());
        }

        let mut complete: Vec<CommitId> = Vec::new();
        for head in heads {
            if store.is_complete(head)? {
                complete.push(*head);
            }
        }
        let Some(first) = complete.first().copied() else {
            let id = heads
                .iter()
                .next()
                .map(|head| head.to_hex())
                .unwrap_or_default();
            return Err(GraphError::IncompleteCommit { id }.into());
        };
        if complete.len() == 1 {
            return Ok(first);
        }

        let complete_set: BTreeSet<CommitId> = complete.iter().copied().collect();
        let base = GraphWalker::best_common_ancestor(store, &complete_set)?;

        let mut head_operations: Vec<Operation> = Vec::with_capacity(complete.len());
        for head in &complete {
            head_operations.push(GraphWalker::path_operation(store, algebra, &base, head)?);
        }

        // Fold the per-head operations pairwise. `merged` is the running
        // base→merged-state operation; `catch_ups[i]` is what head i still
        // has to apply to reach that state.
        let mut merged = head_operations[0].clone();
        let mut catch_ups: Vec<Operation> = vec![Operation::new()];
        for operation in head_operations.iter().skip(1) {
            let t = algebra.transform(&merged, operation)?;
            for catch_up in &mut catch_ups {
                catch_up.extend(t.theirs.clone());
            }
            catch_ups.push(t.ours);
            merged.extend(t.theirs);
            merged = algebra.squash(merged)?;
        }

        let mut parents: BTreeMap<CommitId, Operation> = BTreeMap::new();
        let mut max_level = 0;
        for (head, catch_up) in complete.iter().zip(catch_ups) {
            let commit = store.load_commit(head)?.ok_or_else(|| {
                GraphError::CommitNotFound { id: head.to_hex() }
            })?;
            max_level = max_level.max(commit.level);
            parents.insert(*head, algebra.squash(catch_up)?);
        }

        let commit = Commit::build(parents, max_level, Utc::now());
        store.save_commit(&commit)?;

        let add: BTreeSet<CommitId> = BTreeSet::from([commit.id]);
        if !store.update_heads(repo, heads, &add, &complete_set)? {
            return Err(SyncError::RaceLost { attempts: 1 }.into());
        }
        debug!(merged = %commit.id.short(), base = %base.short(), "heads merged");
        Ok(commit.id)
    }
}
