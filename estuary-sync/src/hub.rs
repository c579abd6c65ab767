//! One session per repository, owned by whoever embeds the engine.

use dashmap::DashMap;
use std::sync::Arc;

use estuary_algebra::Algebra;
use estuary_core::config::SyncConfig;
use estuary_core::errors::EstuaryResult;
use estuary_core::repo::RepoId;
use estuary_core::traits::{CommitStore, Projection};

use crate::session::SyncSession;

/// Hands out [`SyncSession`]s keyed by repository id, creating each lazily
/// from the projection factory. The hub is plain owned state: the
/// embedding application decides its lifetime, and there is no global
/// synchronizer registry.
pub struct SyncHub<P: Projection> {
    store: Arc<dyn CommitStore>,
    algebra: Arc<Algebra>,
    config: SyncConfig,
    make_projection: Box<dyn Fn(&RepoId) -> P + Send + Sync>,
    sessions: DashMap<RepoId, Arc<SyncSession<P>>>,
}

impl<P: Projection> SyncHub<P> {
    /// Create a hub over a store and algebra.
    pub fn new(
        store: Arc<dyn CommitStore>,
        algebra: Arc<Algebra>,
        config: SyncConfig,
        make_projection: impl Fn(&RepoId) -> P + Send + Sync + 'static,
    ) -> Self {
        Self {
            store,
            algebra,
            config,
            make_projection: Box::new(make_projection),
            sessions: DashMap::new(),
        }
    }

    /// The session for `repo`, opened on first use.
    pub fn session(&self, repo: &RepoId) -> EstuaryResult<Arc<SyncSession<P>>> {
        if let Some(existing) = self.sessions.get(repo) {
            return Ok(existing.clone());
        }
        let session = SyncSession::open(
            self.store.clone(),
            self.algebra.clone(),
            self.config.clone(),
            repo.clone(),
            (self.make_projection)(repo),
        )?;
        let entry = self
            .sessions
            .entry(repo.clone())
            .or_insert_with(|| session);
        Ok(entry.clone())
    }

    /// Drop the session for `repo`. Outstanding `Arc` handles stay valid;
    /// the next [`session`](SyncHub::session) call opens a fresh one.
    pub fn close(&self, repo: &RepoId) -> bool {
        self.sessions.remove(repo).is_some()
    }

    /// Number of open sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// True when no session is open.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
