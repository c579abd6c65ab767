//! Schema and connection pragmas.

use rusqlite::Connection;

/// WAL journaling and a busy timeout; the write path is serialized by the
/// store's own mutex.
pub fn apply_pragmas(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "busy_timeout", 5_000)?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(())
}

/// Tables created on open. Commit records are JSON; the columns carry what
/// the queries filter on.
pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS commits (
    id       TEXT PRIMARY KEY,
    record   TEXT NOT NULL,
    level    INTEGER NOT NULL,
    complete INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS commit_edges (
    parent TEXT NOT NULL,
    child  TEXT NOT NULL,
    PRIMARY KEY (parent, child)
);
CREATE INDEX IF NOT EXISTS idx_commit_edges_child ON commit_edges(child);

CREATE TABLE IF NOT EXISTS heads (
    repo      TEXT NOT NULL,
    commit_id TEXT NOT NULL,
    PRIMARY KEY (repo, commit_id)
);

CREATE TABLE IF NOT EXISTS snapshots (
    repo      TEXT NOT NULL,
    commit_id TEXT NOT NULL,
    record    TEXT NOT NULL,
    created   TEXT NOT NULL,
    PRIMARY KEY (repo, commit_id)
);

CREATE TABLE IF NOT EXISTS pull_requests (
    id      TEXT PRIMARY KEY,
    record  TEXT NOT NULL,
    expires TEXT NOT NULL
);
";
