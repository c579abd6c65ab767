/// Commit-graph errors.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("commit {id} not found")]
    CommitNotFound { id: String },

    #[error("commit {id} has missing ancestors")]
    IncompleteCommit { id: String },

    #[error("no common ancestor among heads [{heads}]")]
    NoCommonAncestor { heads: String },

    #[error("repository {repo} has no heads")]
    EmptyHeadSet { repo: String },

    #[error("no path from {from} to {to}")]
    NoPath { from: String, to: String },
}
