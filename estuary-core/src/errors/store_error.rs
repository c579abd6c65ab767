/// Storage-layer errors. Propagated unchanged through the engine; the
/// sync layer never masks them.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("SQLite error: {message}")]
    Sqlite { message: String },

    #[error("malformed commit id {input:?}")]
    MalformedCommitId { input: String },

    #[error("corrupt record for {id}: {reason}")]
    CorruptRecord { id: String, reason: String },

    #[error("snapshot for commit {id} already exists with different contents")]
    SnapshotImmutable { id: String },
}
