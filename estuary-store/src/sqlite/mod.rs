//! SQLite-backed commit store.
//!
//! One write connection behind a mutex, WAL journaling, schema created on
//! open. Commit records are stored as JSON alongside the columns the
//! queries filter on (level, completeness, parent edges).

pub mod schema;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Mutex;
use tracing::instrument;

use estuary_core::commit::{Commit, CommitId, Snapshot};
use estuary_core::errors::{EstuaryError, EstuaryResult, StoreError};
use estuary_core::pull_request::PullRequest;
use estuary_core::repo::RepoId;
use estuary_core::traits::CommitStore;

/// Map a rusqlite failure into the engine's error taxonomy.
fn sql(err: rusqlite::Error) -> EstuaryError {
    StoreError::Sqlite {
        message: err.to_string(),
    }
    .into()
}

fn corrupt(id: &str, err: impl std::fmt::Display) -> EstuaryError {
    StoreError::CorruptRecord {
        id: id.to_string(),
        reason: err.to_string(),
    }
    .into()
}

/// Durable store over a single SQLite database.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a database file.
    pub fn open(path: &Path) -> EstuaryResult<Self> {
        let conn = Connection::open(path).map_err(sql)?;
        Self::init(conn)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> EstuaryResult<Self> {
        let conn = Connection::open_in_memory().map_err(sql)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> EstuaryResult<Self> {
        schema::apply_pragmas(&conn).map_err(sql)?;
        conn.execute_batch(schema::SCHEMA).map_err(sql)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// True when every parent of `id` is present and complete.
    fn parents_complete(conn: &Connection, id: &str) -> EstuaryResult<bool> {
        let missing: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM commit_edges e
                 WHERE e.child = ?1
                   AND IFNULL((SELECT complete FROM commits p WHERE p.id = e.parent), 0) != 1",
                params![id],
                |row| row.get(0),
            )
            .map_err(sql)?;
        Ok(missing == 0)
    }

    /// Flip `id` complete if its parents are, cascading forward through
    /// waiting children. Returns how many rows flipped.
    fn complete_forward(conn: &Connection, id: &str) -> EstuaryResult<usize> {
        let mut flipped = 0;
        let mut queue = vec![id.to_string()];
        while let Some(current) = queue.pop() {
            let already: Option<i64> = conn
                .query_row(
                    "SELECT complete FROM commits WHERE id = ?1",
                    params![current],
                    |row| row.get(0),
                )
                .optional()
                .map_err(sql)?;
            match already {
                None | Some(1) => continue,
                _ => {}
            }
            if !Self::parents_complete(conn, &current)? {
                continue;
            }
            conn.execute(
                "UPDATE commits SET complete = 1 WHERE id = ?1",
                params![current],
            )
            .map_err(sql)?;
            flipped += 1;
            let mut stmt = conn
                .prepare("SELECT child FROM commit_edges WHERE parent = ?1")
                .map_err(sql)?;
            let children = stmt
                .query_map(params![current], |row| row.get::<_, String>(0))
                .map_err(sql)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(sql)?;
            queue.extend(children);
        }
        Ok(flipped)
    }
}

impl CommitStore for SqliteStore {
    #[instrument(skip(self, commit), fields(id = %commit.id.short()))]
    fn save_commit(&self, commit: &Commit) -> EstuaryResult<bool> {
        let conn = self.lock();
        let id = commit.id.to_hex();
        let record =
            serde_json::to_string(commit).map_err(|e| EstuaryError::SerializationError(e.to_string()))?;
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO commits (id, record, level, complete)
                 VALUES (?1, ?2, ?3, 0)",
                params![id, record, commit.level],
            )
            .map_err(sql)?;
        if inserted == 0 {
            return Ok(false);
        }
        for parent in commit.parents.keys() {
            conn.execute(
                "INSERT OR IGNORE INTO commit_edges (parent, child) VALUES (?1, ?2)",
                params![parent.to_hex(), id],
            )
            .map_err(sql)?;
        }
        Self::complete_forward(&conn, &id)?;
        Ok(true)
    }

    fn load_commit(&self, id: &CommitId) -> EstuaryResult<Option<Commit>> {
        let conn = self.lock();
        let hex = id.to_hex();
        let record: Option<String> = conn
            .query_row(
                "SELECT record FROM commits WHERE id = ?1",
                params![hex],
                |row| row.get(0),
            )
            .optional()
            .map_err(sql)?;
        match record {
            None => Ok(None),
            Some(text) => serde_json::from_str(&text)
                .map(Some)
                .map_err(|e| corrupt(&hex, e)),
        }
    }

    fn heads(&self, repo: &RepoId) -> EstuaryResult<BTreeSet<CommitId>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare("SELECT commit_id FROM heads WHERE repo = ?1")
            .map_err(sql)?;
        let rows = stmt
            .query_map(params![repo.as_str()], |row| row.get::<_, String>(0))
            .map_err(sql)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(sql)?;
        let mut heads = BTreeSet::new();
        for hex in rows {
            heads.insert(CommitId::from_hex(&hex)?);
        }
        Ok(heads)
    }

    #[instrument(skip(self, expect, add, remove), fields(repo = %repo))]
    fn update_heads(
        &self,
        repo: &RepoId,
        expect: &BTreeSet<CommitId>,
        add: &BTreeSet<CommitId>,
        remove: &BTreeSet<CommitId>,
    ) -> EstuaryResult<bool> {
        let mut conn = self.lock();
        let tx = conn.transaction().map_err(sql)?;
        let current: BTreeSet<CommitId> = {
            let mut stmt = tx
                .prepare("SELECT commit_id FROM heads WHERE repo = ?1")
                .map_err(sql)?;
            let rows = stmt
                .query_map(params![repo.as_str()], |row| row.get::<_, String>(0))
                .map_err(sql)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(sql)?;
            let mut set = BTreeSet::new();
            for hex in rows {
                set.insert(CommitId::from_hex(&hex)?);
            }
            set
        };
        if &current != expect {
            return Ok(false);
        }
        for id in remove {
            tx.execute(
                "DELETE FROM heads WHERE repo = ?1 AND commit_id = ?2",
                params![repo.as_str(), id.to_hex()],
            )
            .map_err(sql)?;
        }
        for id in add {
            tx.execute(
                "INSERT OR IGNORE INTO heads (repo, commit_id) VALUES (?1, ?2)",
                params![repo.as_str(), id.to_hex()],
            )
            .map_err(sql)?;
        }
        tx.commit().map_err(sql)?;
        Ok(true)
    }

    fn save_snapshot(&self, repo: &RepoId, snapshot: &Snapshot) -> EstuaryResult<()> {
        let conn = self.lock();
        let hex = snapshot.commit.to_hex();
        let existing: Option<String> = conn
            .query_row(
                "SELECT record FROM snapshots WHERE repo = ?1 AND commit_id = ?2",
                params![repo.as_str(), hex],
                |row| row.get(0),
            )
            .optional()
            .map_err(sql)?;
        if let Some(text) = existing {
            let stored: Snapshot = serde_json::from_str(&text).map_err(|e| corrupt(&hex, e))?;
            if stored.operation != snapshot.operation {
                return Err(StoreError::SnapshotImmutable { id: hex }.into());
            }
            return Ok(());
        }
        let record = serde_json::to_string(snapshot)
            .map_err(|e| EstuaryError::SerializationError(e.to_string()))?;
        conn.execute(
            "INSERT INTO snapshots (repo, commit_id, record, created) VALUES (?1, ?2, ?3, ?4)",
            params![repo.as_str(), hex, record, snapshot.created.to_rfc3339()],
        )
        .map_err(sql)?;
        Ok(())
    }

    fn load_snapshot(
        &self,
        repo: &RepoId,
        commit: &CommitId,
    ) -> EstuaryResult<Option<Snapshot>> {
        let conn = self.lock();
        let hex = commit.to_hex();
        let record: Option<String> = conn
            .query_row(
                "SELECT record FROM snapshots WHERE repo = ?1 AND commit_id = ?2",
                params![repo.as_str(), hex],
                |row| row.get(0),
            )
            .optional()
            .map_err(sql)?;
        match record {
            None => Ok(None),
            Some(text) => serde_json::from_str(&text)
                .map(Some)
                .map_err(|e| corrupt(&hex, e)),
        }
    }

    fn list_snapshots(&self, repo: &RepoId) -> EstuaryResult<Vec<Snapshot>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare("SELECT record FROM snapshots WHERE repo = ?1 ORDER BY created ASC")
            .map_err(sql)?;
        let rows = stmt
            .query_map(params![repo.as_str()], |row| row.get::<_, String>(0))
            .map_err(sql)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(sql)?;
        let mut snapshots = Vec::with_capacity(rows.len());
        for text in rows {
            snapshots.push(
                serde_json::from_str(&text).map_err(|e| corrupt(repo.as_str(), e))?,
            );
        }
        Ok(snapshots)
    }

    fn children(&self, id: &CommitId) -> EstuaryResult<BTreeSet<CommitId>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare("SELECT child FROM commit_edges WHERE parent = ?1")
            .map_err(sql)?;
        let rows = stmt
            .query_map(params![id.to_hex()], |row| row.get::<_, String>(0))
            .map_err(sql)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(sql)?;
        let mut children = BTreeSet::new();
        for hex in rows {
            children.insert(CommitId::from_hex(&hex)?);
        }
        Ok(children)
    }

    fn is_complete(&self, id: &CommitId) -> EstuaryResult<bool> {
        let conn = self.lock();
        let complete: Option<i64> = conn
            .query_row(
                "SELECT complete FROM commits WHERE id = ?1",
                params![id.to_hex()],
                |row| row.get(0),
            )
            .optional()
            .map_err(sql)?;
        Ok(complete == Some(1))
    }

    #[instrument(skip(self))]
    fn mark_complete_commits(&self) -> EstuaryResult<usize> {
        let conn = self.lock();
        let mut flipped = 0;
        loop {
            let changed = conn
                .execute(
                    "UPDATE commits SET complete = 1
                     WHERE complete = 0
                       AND NOT EXISTS (
                           SELECT 1 FROM commit_edges e
                           WHERE e.child = commits.id
                             AND IFNULL((SELECT complete FROM commits p
                                         WHERE p.id = e.parent), 0) != 1
                       )",
                    [],
                )
                .map_err(sql)?;
            if changed == 0 {
                break;
            }
            flipped += changed;
        }
        Ok(flipped)
    }

    fn all_commit_ids(&self) -> EstuaryResult<Vec<CommitId>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT id FROM commits").map_err(sql)?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(sql)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(sql)?;
        let mut ids = Vec::with_capacity(rows.len());
        for hex in rows {
            ids.push(CommitId::from_hex(&hex)?);
        }
        Ok(ids)
    }

    #[instrument(skip(self), fields(id = %id.short()))]
    fn delete_commit(&self, id: &CommitId) -> EstuaryResult<bool> {
        let mut conn = self.lock();
        let tx = conn.transaction().map_err(sql)?;
        let hex = id.to_hex();
        let deleted = tx
            .execute("DELETE FROM commits WHERE id = ?1", params![hex])
            .map_err(sql)?;
        tx.execute(
            "DELETE FROM commit_edges WHERE parent = ?1 OR child = ?1",
            params![hex],
        )
        .map_err(sql)?;
        tx.commit().map_err(sql)?;
        Ok(deleted > 0)
    }

    fn save_pull_request(&self, request: &PullRequest) -> EstuaryResult<()> {
        let conn = self.lock();
        let record = serde_json::to_string(request)
            .map_err(|e| EstuaryError::SerializationError(e.to_string()))?;
        conn.execute(
            "INSERT OR REPLACE INTO pull_requests (id, record, expires) VALUES (?1, ?2, ?3)",
            params![
                request.id.to_string(),
                record,
                request.expires.to_rfc3339()
            ],
        )
        .map_err(sql)?;
        Ok(())
    }

    fn live_pull_requests(&self, now: DateTime<Utc>) -> EstuaryResult<Vec<PullRequest>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare("SELECT record FROM pull_requests WHERE expires > ?1")
            .map_err(sql)?;
        let rows = stmt
            .query_map(params![now.to_rfc3339()], |row| row.get::<_, String>(0))
            .map_err(sql)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(sql)?;
        let mut requests = Vec::with_capacity(rows.len());
        for text in rows {
            requests.push(
                serde_json::from_str(&text)
                    .map_err(|e| corrupt("pull_request", e))?,
            );
        }
        Ok(requests)
    }
}
