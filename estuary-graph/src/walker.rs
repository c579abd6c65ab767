//! Commit-graph traversal.
//!
//! All walks are level-bounded: a commit's level is `1 + max(parent
//! levels)`, assigned at build time, so a backward walk knows when a target
//! can no longer appear below the frontier.

use std::collections::{BTreeSet, BinaryHeap, HashMap, HashSet, VecDeque};

use estuary_algebra::Algebra;
use estuary_core::commit::{Commit, CommitId};
use estuary_core::diff::Operation;
use estuary_core::errors::{EstuaryResult, GraphError};
use estuary_core::traits::CommitStore;

/// Stateless traversal over a [`CommitStore`].
pub struct GraphWalker;

fn load(store: &dyn CommitStore, id: &CommitId) -> EstuaryResult<Commit> {
    store.load_commit(id)?.ok_or_else(|| {
        GraphError::CommitNotFound { id: id.to_hex() }.into()
    })
}

impl GraphWalker {
    /// Common ancestors of every id in `ids`, walking backward from the
    /// highest-level frontier first.
    ///
    /// Each visited commit tracks the subset of `ids` that reaches it; a
    /// commit reached by all of them is a common ancestor, and the walk
    /// does not descend past it. The result may contain nested ancestors
    /// from parallel branches; [`best_common_ancestor`] picks the deepest.
    ///
    /// [`best_common_ancestor`]: GraphWalker::best_common_ancestor
    pub fn lowest_common_ancestors(
        store: &dyn CommitStore,
        ids: &BTreeSet<CommitId>,
    ) -> EstuaryResult<BTreeSet<CommitId>> {
        if ids.is_empty() {
            return Err(GraphError::EmptyHeadSet {
                repo: "<query>".to_string(),
            }
            .into());
        }
        if ids.len() == 1 {
            return Ok(ids.clone());
        }

        let total = ids.len();
        let mut marks: HashMap<CommitId, BTreeSet<usize>> = HashMap::new();
        let mut frontier: BinaryHeap<(u32, CommitId)> = BinaryHeap::new();
        let mut processed: HashSet<CommitId> = HashSet::new();
        let mut common: BTreeSet<CommitId> = BTreeSet::new();

        for (index, id) in ids.iter().enumerate() {
            marks.entry(*id).or_default().insert(index);
            let level = load(store, id)?.level;
            frontier.push((level, *id));
        }

        // Children have strictly higher levels than parents, so popping by
        // level guarantees every child has contributed its marks before a
        // parent is examined.
        while let Some((_, id)) = frontier.pop() {
            if !processed.insert(id) {
                continue;
            }
            let mark = marks.get(&id).cloned().unwrap_or_default();
            if mark.len() == total {
                common.insert(id);
                continue;
            }
            let commit = load(store, &id)?;
            for parent in commit.parents.keys() {
                let entry = marks.entry(*parent).or_default();
                entry.extend(mark.iter().copied());
                if !processed.contains(parent) {
                    let level = load(store, parent)?.level;
                    frontier.push((level, *parent));
                }
            }
        }

        if common.is_empty() {
            let heads = ids
                .iter()
                .map(|id| id.short())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(GraphError::NoCommonAncestor { heads }.into());
        }
        Ok(common)
    }

    /// The deepest common ancestor of `ids`; ties broken by commit id
    /// ordering for determinism.
    pub fn best_common_ancestor(
        store: &dyn CommitStore,
        ids: &BTreeSet<CommitId>,
    ) -> EstuaryResult<CommitId> {
        let candidates = Self::lowest_common_ancestors(store, ids)?;
        let mut best: Option<(u32, CommitId)> = None;
        for id in candidates {
            let level = load(store, &id)?.level;
            if best.map(|current| (level, id) > current).unwrap_or(true) {
                best = Some((level, id));
            }
        }
        best.map(|(_, id)| id).ok_or_else(|| {
            GraphError::NoCommonAncestor {
                heads: String::new(),
            }
            .into()
        })
    }

    /// The squashed operation along one simple path `from → to`.
    ///
    /// When prior merges give several paths, any of them is valid: merge
    /// construction makes them semantically equivalent. `from == to`
    /// yields the empty operation.
    pub fn path_operation(
        store: &dyn CommitStore,
        algebra: &Algebra,
        from: &CommitId,
        to: &CommitId,
    ) -> EstuaryResult<Operation> {
        if from == to {
            return Ok(Operation::new());
        }
        let floor = load(store, from)?.level;

        // Backward discovery from `to`; each discovered parent remembers
        // which child found it and the edge operation between them.
        let mut step: HashMap<CommitId, (CommitId, Operation)> = HashMap::new();
        let mut seen: HashSet<CommitId> = HashSet::from([*to]);
        let mut queue: VecDeque<CommitId> = VecDeque::from([*to]);
        let mut found = false;

        while let Some(current) = queue.pop_front() {
            if current == *from {
                found = true;
                break;
            }
            let commit = load(store, &current)?;
            if commit.level <= floor {
                continue;
            }
            for (parent, edge) in &commit.parents {
                if seen.insert(*parent) {
                    step.insert(*parent, (current, edge.clone()));
                    queue.push_back(*parent);
                }
            }
        }
        if !found {
            return Err(GraphError::NoPath {
                from: from.short(),
                to: to.short(),
            }
            .into());
        }

        // Replay forward along the discovered path.
        let mut operation = Operation::new();
        let mut cursor = *from;
        while cursor != *to {
            let (child, edge) = step
                .get(&cursor)
                .cloned()
                .ok_or_else(|| GraphError::NoPath {
                    from: from.short(),
                    to: to.short(),
                })?;
            operation.extend(edge);
            cursor = child;
        }
        algebra.squash(operation)
    }

    /// Every commit reachable backward from `ids`, including `ids`
    /// themselves. Missing ancestors are tolerated: pending history simply
    /// ends the walk on that branch.
    pub fn reachable_from(
        store: &dyn CommitStore,
        ids: &BTreeSet<CommitId>,
    ) -> EstuaryResult<BTreeSet<CommitId>> {
        let mut seen: BTreeSet<CommitId> = ids.clone();
        let mut queue: VecDeque<CommitId> = ids.iter().copied().collect();
        while let Some(current) = queue.pop_front() {
            let Some(commit) = store.load_commit(&current)? else {
                continue;
            };
            for parent in commit.parents.keys() {
                if seen.insert(*parent) {
                    queue.push_back(*parent);
                }
            }
        }
        Ok(seen)
    }
}
