//! Pull requests — advisory merge requests between repositories.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::commit::CommitId;
use crate::repo::RepoId;

/// A signed request from one repository asking to be merged into another.
///
/// Advisory, not authoritative: the engine never acts on a pull request by
/// itself, but retention must keep the referenced head alive until the
/// request expires. The signature is opaque here; verification belongs to
/// the transport that carried the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequest {
    /// Request identity.
    pub id: Uuid,
    /// Repository asking to be merged.
    pub source_repo: RepoId,
    /// Repository being asked.
    pub target_repo: RepoId,
    /// The head the source wants merged.
    pub head: CommitId,
    /// Opaque signature over the request, as produced by the transport.
    pub signature: Vec<u8>,
    /// After this instant the request no longer pins anything.
    pub expires: DateTime<Utc>,
}

impl PullRequest {
    /// Create a pull request with a fresh id.
    pub fn new(
        source_repo: RepoId,
        target_repo: RepoId,
        head: CommitId,
        signature: Vec<u8>,
        expires: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_repo,
            target_repo,
            head,
            signature,
            expires,
        }
    }

    /// True while the request still pins its head.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires > now
    }
}
