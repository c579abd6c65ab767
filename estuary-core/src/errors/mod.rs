//! Error taxonomy for the Estuary engine.
//!
//! One thiserror enum per domain, folded into the umbrella [`EstuaryError`].
//! Conflicts and malformed operations are the only errors that should alter
//! application state; races are retried, incompleteness triggers a fetch,
//! storage failures propagate unchanged.

pub mod algebra_error;
pub mod graph_error;
pub mod store_error;
pub mod sync_error;

pub use algebra_error::AlgebraError;
pub use graph_error::GraphError;
pub use store_error::StoreError;
pub use sync_error::SyncError;

/// Umbrella error for the whole workspace.
#[derive(Debug, thiserror::Error)]
pub enum EstuaryError {
    #[error("algebra error: {0}")]
    AlgebraError(#[from] AlgebraError),

    #[error("graph error: {0}")]
    GraphError(#[from] GraphError),

    #[error("storage error: {0}")]
    StoreError(#[from] StoreError),

    #[error("sync error: {0}")]
    SyncError(#[from] SyncError),

    #[error("serialization error: {0}")]
    SerializationError(String),
}

impl EstuaryError {
    /// True if this is an algebraic conflict (surfaced to the caller,
    /// never retried automatically).
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            EstuaryError::AlgebraError(AlgebraError::Conflict { .. })
        )
    }

    /// True if this is a lost head race (retried transparently up to the
    /// configured attempt budget).
    pub fn is_race_lost(&self) -> bool {
        matches!(self, EstuaryError::SyncError(SyncError::RaceLost { .. }))
    }

    /// True if a referenced ancestor is missing locally (a fetch trigger,
    /// not a hard failure).
    pub fn is_incomplete(&self) -> bool {
        matches!(
            self,
            EstuaryError::GraphError(GraphError::IncompleteCommit { .. })
        )
    }
}

/// Workspace-wide result alias.
pub type EstuaryResult<T> = Result<T, EstuaryError>;
