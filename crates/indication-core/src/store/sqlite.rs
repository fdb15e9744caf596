//! SQLite-backed key-value store.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use super::{key_matcher, BatchOp, KvStore, ScanPage, StoreError, StoreResult, SCHEMA};

/// Key-value store persisted in a SQLite database.
///
/// Every call runs on the blocking pool against a single shared connection.
/// Sets live in their own table, so `scan` only walks string entries.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open database at path, creating if needed.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        Self::initialize(conn)
    }

    /// Create in-memory database (for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::initialize(conn)
    }

    fn initialize(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(SCHEMA)?;
        purge_expired(&conn, now_millis())?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn run<T, F>(&self, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|_| StoreError::Poisoned)?;
            f(&mut guard)
        })
        .await?
    }
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn expiry_millis(now: i64, ttl: Duration) -> i64 {
    let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
    now.saturating_add(ttl_ms)
}

fn purge_expired(conn: &Connection, now: i64) -> StoreResult<usize> {
    let removed = conn.execute(
        "DELETE FROM kv_entries WHERE expires_at IS NOT NULL AND expires_at <= ?1",
        [now],
    )?;
    Ok(removed)
}

fn apply(conn: &Connection, op: &BatchOp, now: i64) -> StoreResult<bool> {
    match op {
        BatchOp::SetEx { key, value, ttl } => {
            conn.execute(
                r#"
                INSERT INTO kv_entries (key, value, expires_at) VALUES (?1, ?2, ?3)
                ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    expires_at = excluded.expires_at
                "#,
                params![key, value, expiry_millis(now, *ttl)],
            )?;
            Ok(true)
        }
        BatchOp::SetAdd { set, member } => {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO kv_set_members (set_key, member) VALUES (?1, ?2)",
                params![set, member],
            )?;
            Ok(inserted > 0)
        }
        BatchOp::SetRemove { set, member } => {
            let removed = conn.execute(
                "DELETE FROM kv_set_members WHERE set_key = ?1 AND member = ?2",
                params![set, member],
            )?;
            Ok(removed > 0)
        }
        BatchOp::Delete { key } => {
            let live = conn.execute(
                "DELETE FROM kv_entries WHERE key = ?1 AND (expires_at IS NULL OR expires_at > ?2)",
                params![key, now],
            )?;
            conn.execute("DELETE FROM kv_entries WHERE key = ?1", [key])?;
            let members = conn.execute("DELETE FROM kv_set_members WHERE set_key = ?1", [key])?;
            Ok(live > 0 || members > 0)
        }
    }
}

#[async_trait]
impl KvStore for SqliteStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let key = key.to_string();
        self.run(move |conn| {
            let value = conn
                .query_row(
                    "SELECT value FROM kv_entries WHERE key = ?1 AND (expires_at IS NULL OR expires_at > ?2)",
                    params![key, now_millis()],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(value)
        })
        .await
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        self.exec_batch(vec![BatchOp::SetEx {
            key: key.to_string(),
            value: value.to_string(),
            ttl,
        }])
        .await
    }

    async fn set_add(&self, set: &str, member: &str) -> StoreResult<()> {
        let op = BatchOp::SetAdd {
            set: set.to_string(),
            member: member.to_string(),
        };
        self.run(move |conn| apply(conn, &op, now_millis()).map(|_| ()))
            .await
    }

    async fn set_remove(&self, set: &str, member: &str) -> StoreResult<()> {
        let op = BatchOp::SetRemove {
            set: set.to_string(),
            member: member.to_string(),
        };
        self.run(move |conn| apply(conn, &op, now_millis()).map(|_| ()))
            .await
    }

    async fn set_members(&self, set: &str) -> StoreResult<BTreeSet<String>> {
        let set = set.to_string();
        self.run(move |conn| {
            let mut stmt = conn.prepare("SELECT member FROM kv_set_members WHERE set_key = ?1")?;
            let rows = stmt.query_map([set], |row| row.get::<_, String>(0))?;

            let mut members = BTreeSet::new();
            for row in rows {
                members.insert(row?);
            }
            Ok(members)
        })
        .await
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let op = BatchOp::Delete {
            key: key.to_string(),
        };
        self.run(move |conn| apply(conn, &op, now_millis())).await
    }

    async fn scan(&self, cursor: u64, pattern: &str, count: usize) -> StoreResult<ScanPage> {
        let matcher = key_matcher(pattern)?;
        let count = count.max(1);
        self.run(move |conn| {
            let now = now_millis();
            let mut stmt = conn.prepare(
                "SELECT rowid, key, expires_at FROM kv_entries WHERE rowid > ?1 ORDER BY rowid LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![cursor as i64, count as i64], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<i64>>(2)?,
                ))
            })?;

            let mut examined = 0;
            let mut last_rowid = 0;
            let mut keys = Vec::new();
            for row in rows {
                let (rowid, key, expires_at) = row?;
                examined += 1;
                last_rowid = rowid;
                let live = expires_at.map_or(true, |at| at > now);
                if live && matcher.is_match(&key) {
                    keys.push(key);
                }
            }

            let cursor = if examined < count { 0 } else { last_rowid as u64 };
            Ok(ScanPage { cursor, keys })
        })
        .await
    }

    async fn exec_batch(&self, ops: Vec<BatchOp>) -> StoreResult<()> {
        self.run(move |conn| {
            let now = now_millis();
            let tx = conn.transaction()?;
            for op in &ops {
                apply(&tx, op, now)?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn purge_expired(&self) -> StoreResult<usize> {
        self.run(|conn| purge_expired(conn, now_millis())).await
    }
}
