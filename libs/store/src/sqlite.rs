//! SQLite-backed event store.
//!
//! One `events` table keyed by event id. The full event JSON is kept in
//! `document`; the columns the aggregate queries need are extracted at
//! insert time, including the minute-of-hour bucket.
//!
//! All database work runs on the blocking pool.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::{params, Connection, ErrorCode, OpenFlags};
use tracing::{debug, info};
use types::event::Event;

use crate::error::StoreError;
use crate::query::{MinuteCount, RepoCount};
use crate::report::{InsertFailure, InsertReport};
use crate::EventStore;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS events (
    id               TEXT PRIMARY KEY,
    type             TEXT NOT NULL,
    actor_login      TEXT NOT NULL,
    actor_avatar_url TEXT NOT NULL,
    repo_name        TEXT NOT NULL,
    created_at       TEXT NOT NULL,
    created_minute   INTEGER NOT NULL,
    commit_count     INTEGER NOT NULL DEFAULT 0,
    document         TEXT NOT NULL,
    inserted_at      TEXT NOT NULL DEFAULT (datetime('now'))
);
CREATE INDEX IF NOT EXISTS idx_events_repo ON events(repo_name);
CREATE INDEX IF NOT EXISTS idx_events_type ON events(type);
CREATE INDEX IF NOT EXISTS idx_events_actor ON events(actor_login);
CREATE INDEX IF NOT EXISTS idx_events_minute ON events(created_minute);
";

const INSERT_EVENT: &str = "
INSERT INTO events
    (id, type, actor_login, actor_avatar_url, repo_name, created_at, created_minute, commit_count, document)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
";

/// Event store in a SQLite database file.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )?;
        let _mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.execute_batch(SCHEMA)?;

        info!(path = %path.display(), "SQLite event store opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Private in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard: MutexGuard<'_, Connection> =
                conn.lock().map_err(|_| StoreError::Poisoned)?;
            f(&mut guard)
        })
        .await?
    }

    async fn query_u64(&self, sql: &'static str) -> Result<u64, StoreError> {
        self.with_conn(move |conn| {
            let value: i64 = conn.query_row(sql, [], |row| row.get(0))?;
            Ok(value.max(0) as u64)
        })
        .await
    }
}

fn is_duplicate_key(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => {
            e.code == ErrorCode::ConstraintViolation
                && e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
        }
        _ => false,
    }
}

fn insert_all(conn: &mut Connection, events: &[Event]) -> Result<InsertReport, StoreError> {
    let mut report = InsertReport::new(events.len());
    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare_cached(INSERT_EVENT)?;
        for (index, event) in events.iter().enumerate() {
            let document = match event.to_json() {
                Ok(doc) => doc,
                Err(e) => {
                    report.failures.push(InsertFailure {
                        index,
                        id: event.id.clone(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            let result = stmt.execute(params![
                event.id.as_str(),
                event.kind.as_tag(),
                event.actor.login,
                event.actor.avatar_url,
                event.repo.name,
                event.created_at.to_rfc3339(),
                event.minute_bucket(),
                event.commit_count() as i64,
                document,
            ]);

            match result {
                Ok(_) => report.inserted += 1,
                Err(e) if is_duplicate_key(&e) => report.duplicates += 1,
                Err(e) => report.failures.push(InsertFailure {
                    index,
                    id: event.id.clone(),
                    reason: e.to_string(),
                }),
            }
        }
    }
    tx.commit()?;
    Ok(report)
}

#[async_trait]
impl EventStore for SqliteStore {
    async fn insert_many(&self, events: &[Event]) -> Result<InsertReport, StoreError> {
        if events.is_empty() {
            return Ok(InsertReport::default());
        }
        let events = events.to_vec();
        let report = self.with_conn(move |conn| insert_all(conn, &events)).await?;
        debug!(
            attempted = report.attempted,
            inserted = report.inserted,
            duplicates = report.duplicates,
            failed = report.failures.len(),
            "Bulk insert finished"
        );
        Ok(report)
    }

    async fn count_events(&self) -> Result<u64, StoreError> {
        self.query_u64("SELECT COUNT(*) FROM events").await
    }

    async fn distinct_actor_count(&self) -> Result<u64, StoreError> {
        self.query_u64("SELECT COUNT(DISTINCT actor_login) FROM events")
            .await
    }

    async fn total_commits(&self) -> Result<u64, StoreError> {
        self.query_u64(
            "SELECT COALESCE(SUM(commit_count), 0) FROM events WHERE type = 'PushEvent'",
        )
        .await
    }

    async fn top_repos(&self, limit: usize) -> Result<Vec<RepoCount>, StoreError> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT repo_name, COUNT(*) AS n FROM events
                 GROUP BY repo_name
                 ORDER BY n DESC, repo_name ASC
                 LIMIT ?1",
            )?;
            let rows = stmt
                .query_map([limit as i64], |row| {
                    Ok(RepoCount {
                        name: row.get(0)?,
                        count: row.get::<_, i64>(1)?.max(0) as u64,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    async fn activity_by_minute(&self) -> Result<Vec<MinuteCount>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT created_minute, COUNT(*) FROM events
                 GROUP BY created_minute
                 ORDER BY created_minute ASC",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(MinuteCount {
                        minute: row.get(0)?,
                        count: row.get::<_, i64>(1)?.max(0) as u64,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }
}
