//! SQLite-backed metadata cache with per-entry freshness
//!
//! The cache is the only durable state in the system. Every entry carries
//! the timestamp it was fetched at and the TTL it was stored with; an
//! entry is stale iff `now - fetched_at > ttl`, and staleness is the only
//! automatic re-fetch trigger.

use std::future::Future;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, TimeDelta, Utc};
use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::version::error::CacheError;

/// Schema migrations
/// Each version contains a list of SQL statements to execute
const MIGRATIONS: &[&[&str]] = &[
    // v1: lookup support for expiry sweeps
    &["CREATE INDEX IF NOT EXISTS idx_entries_fetched_at ON entries(fetched_at)"],
];

/// Composite cache key: {tool, provider, query parameters}
///
/// Two origins of the same tool always produce distinct keys because the
/// origin's query parameters are part of the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    tool: String,
    provider: String,
    params: Vec<(String, String)>,
}

impl CacheKey {
    pub fn new(tool: &str, provider: &str) -> Self {
        Self {
            tool: tool.to_string(),
            provider: provider.to_string(),
            params: Vec::new(),
        }
    }

    /// Append a query parameter; empty values are kept out of the key
    pub fn param(mut self, name: &str, value: &str) -> Self {
        if !value.is_empty() {
            self.params.push((name.to_string(), value.to_string()));
        }
        self
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}|{}", self.tool, self.provider)?;
        for (name, value) in &self.params {
            write!(f, "|{}={}", name, value)?;
        }
        Ok(())
    }
}

/// One stored entry, as returned by [`Cache::lookup`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub payload: String,
    pub fetched_at: DateTime<Utc>,
    pub ttl: TimeDelta,
}

impl CacheEntry {
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        now - self.fetched_at > self.ttl
    }
}

pub struct Cache {
    conn: Mutex<Connection>,
}

impl Cache {
    pub fn open(db_path: &Path) -> Result<Self, CacheError> {
        info!("Opening metadata cache at {:?}", db_path);

        let conn = Connection::open(db_path)?;

        // Enable WAL mode for better concurrency
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        let cache = Self {
            conn: Mutex::new(conn),
        };
        cache.create_schema()?;

        Ok(cache)
    }

    /// Acquire database connection lock with proper error handling
    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>, CacheError> {
        self.conn.lock().map_err(|_| CacheError::LockPoisoned)
    }

    fn create_schema(&self) -> Result<(), CacheError> {
        let conn = self.lock_conn()?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS entries (
                key TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                fetched_at INTEGER NOT NULL,
                ttl_secs INTEGER NOT NULL
            )
            "#,
            [],
        )?;

        Self::apply_migrations(&conn)?;

        debug!("Cache schema ready");
        Ok(())
    }

    /// Apply pending migrations based on user_version pragma
    fn apply_migrations(conn: &Connection) -> Result<(), CacheError> {
        let current_version: i32 =
            conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

        for (i, statements) in MIGRATIONS.iter().enumerate() {
            let version = (i + 1) as i32;
            if version > current_version {
                for sql in *statements {
                    conn.execute(sql, [])?;
                }
                debug!("Applied migration v{}", version);
            }
        }

        let target_version = MIGRATIONS.len() as i32;
        if target_version > current_version {
            conn.pragma_update(None, "user_version", target_version)?;
        }

        Ok(())
    }

    pub fn lookup(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        let conn = self.lock_conn()?;
        let result = conn.query_row(
            "SELECT payload, fetched_at, ttl_secs FROM entries WHERE key = ?1",
            [key.to_string()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            },
        );

        match result {
            Ok((payload, fetched_at, ttl_secs)) => Ok(Some(CacheEntry {
                payload,
                fetched_at: DateTime::from_timestamp(fetched_at, 0)
                    .unwrap_or_else(|| DateTime::<Utc>::MIN_UTC),
                ttl: TimeDelta::seconds(ttl_secs),
            })),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Store a payload under a key, overwriting any previous entry.
    /// Racing writers for the same key are last-writer-wins.
    pub fn store(&self, key: &CacheKey, payload: &str, ttl: TimeDelta) -> Result<(), CacheError> {
        let conn = self.lock_conn()?;
        conn.execute(
            r#"
            INSERT INTO entries (key, payload, fetched_at, ttl_secs)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(key) DO UPDATE SET
                payload = excluded.payload,
                fetched_at = excluded.fetched_at,
                ttl_secs = excluded.ttl_secs
            "#,
            (
                key.to_string(),
                payload,
                Utc::now().timestamp(),
                ttl.num_seconds(),
            ),
        )?;
        Ok(())
    }

    /// Return the cached payload when a fresh entry exists, otherwise run
    /// `fetch` and store its result.
    ///
    /// `force_refresh` invokes `fetch` regardless of freshness. A fetch
    /// failure never evicts: when a stale entry exists it is returned as a
    /// degraded answer, otherwise the failure propagates.
    pub async fn get_or_fetch<F, Fut, E>(
        &self,
        key: &CacheKey,
        ttl: TimeDelta,
        force_refresh: bool,
        fetch: F,
    ) -> Result<String, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, E>>,
        E: From<CacheError> + std::fmt::Display,
    {
        if !force_refresh {
            if let Some(entry) = self.lookup(key)? {
                if !entry.is_stale(Utc::now()) {
                    debug!("Cache hit for {}", key);
                    return Ok(entry.payload);
                }
            }
        }

        match fetch().await {
            Ok(payload) => {
                self.store(key, &payload, ttl)?;
                Ok(payload)
            }
            Err(e) => {
                if let Ok(Some(entry)) = self.lookup(key) {
                    warn!("Fetch for {} failed ({}), using stale cache entry", key, e);
                    return Ok(entry.payload);
                }
                Err(e)
            }
        }
    }
}
