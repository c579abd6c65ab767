/// Diff-algebra errors: conflicts and malformed operations.
#[derive(Debug, thiserror::Error)]
pub enum AlgebraError {
    #[error("conflicting {kind} diffs on {subject}: {reason}")]
    Conflict {
        kind: String,
        subject: String,
        reason: String,
    },

    #[error("no semantics registered for diff kind {kind:?}")]
    UnknownKind { kind: String },

    #[error("malformed {kind} payload: {reason}")]
    BadPayload { kind: String, reason: String },
}
