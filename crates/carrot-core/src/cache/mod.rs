//! `SQLite`-backed durable request queue.
//!
//! The cache must not lose a request between "the player performed an action"
//! and "the server confirmed or permanently rejected it". Requests are
//! persisted before any network attempt and removed only on a final server
//! verdict; everything else increments a retry counter and leaves the row in
//! place for the replay loop.
//!
//! All mutations are serialized under a single per-store mutex; persistence
//! calls are infrequent, so a global lock is acceptable here. If the database
//! cannot be opened the cache degrades to a disabled pass-through: immediate
//! sends still work, nothing is durably queued.

// SQLite returns i64 for row IDs and counts, but they're always non-negative.
// Mutex poisoning indicates a panic in another thread, which is unrecoverable.
#![allow(clippy::cast_sign_loss, clippy::missing_panics_doc)]

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{Connection, OpenFlags, params};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

#[cfg(test)]
mod tests;

/// Schema SQL embedded at compile time.
const SCHEMA_SQL: &str = include_str!("schema.sql");

/// Errors opening or initializing the request cache.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CacheError {
    /// Database error from `SQLite`.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// One persisted, not-yet-confirmed call to the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedRequest {
    /// Backend path, e.g. `/me/achievements.json`.
    pub endpoint: String,

    /// Call parameters as persisted; envelope fields are merged at send time.
    pub parameters: Map<String, Value>,

    /// Opaque unique id (UUID v4) generated once at creation. The server uses
    /// it for idempotent dedup, so a replayed request keeps its original id.
    pub request_id: String,

    /// Unix timestamp (seconds) stamped at creation.
    pub request_date: i64,

    /// Times this request has transiently failed. Triage ordering only; no
    /// backoff schedule is derived from it.
    pub retry_count: u32,

    /// Storage-assigned rowid. `None` until the record is persisted, or when
    /// persistence failed and the record exists only for an immediate send.
    pub cache_id: Option<i64>,
}

impl CachedRequest {
    fn new(endpoint: impl Into<String>, parameters: Map<String, Value>) -> Self {
        let request_date = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs() as i64)
            .unwrap_or(0);

        Self {
            endpoint: endpoint.into(),
            parameters,
            request_id: Uuid::new_v4().to_string(),
            request_date,
            retry_count: 0,
            cache_id: None,
        }
    }
}

impl std::fmt::Display for CachedRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}] {} - {}",
            self.cache_id.map_or_else(|| "-".to_string(), |id| id.to_string()),
            self.request_id,
            self.endpoint
        )
    }
}

/// Durable queue of pending signed requests.
pub struct RequestCache {
    /// `None` when the store could not be opened and the cache is running in
    /// disabled pass-through mode.
    conn: Option<Arc<Mutex<Connection>>>,
}

impl RequestCache {
    /// Opens or creates the cache database at the specified path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let conn = Connection::open_with_flags(
            path.as_ref(),
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.execute_batch(SCHEMA_SQL)?;

        Ok(Self {
            conn: Some(Arc::new(Mutex::new(conn))),
        })
    }

    /// Creates a cache that lives only as long as the process.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub fn in_memory() -> Result<Self, CacheError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;

        Ok(Self {
            conn: Some(Arc::new(Mutex::new(conn))),
        })
    }

    /// Creates a disabled pass-through cache. Nothing is queued; immediate
    /// sends still work.
    #[must_use]
    pub const fn disabled() -> Self {
        Self { conn: None }
    }

    /// Opens the cache at `path`, or in memory when `path` is `None`. Falls
    /// back to the disabled pass-through on failure so a broken store never
    /// makes the whole client unusable.
    #[must_use]
    pub fn open_or_disabled(path: Option<&Path>) -> Self {
        let opened = match path {
            Some(path) => Self::open(path),
            None => Self::in_memory(),
        };
        match opened {
            Ok(cache) => cache,
            Err(err) => {
                tracing::warn!(error = %err, "failed to open request cache; running without durability");
                Self::disabled()
            },
        }
    }

    /// Whether requests are actually being queued.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.conn.is_some()
    }

    /// Stamps and persists a new request.
    ///
    /// Fails softly: on a storage error the record is still returned, just
    /// without a `cache_id`, so the caller can attempt an immediate send even
    /// though durability was lost.
    pub fn enqueue(
        &self,
        endpoint: impl Into<String>,
        parameters: Map<String, Value>,
    ) -> CachedRequest {
        let mut record = CachedRequest::new(endpoint, parameters);
        let Some(conn) = &self.conn else {
            return record;
        };

        let payload = Value::Object(record.parameters.clone()).to_string();
        let conn = conn.lock().unwrap();
        let inserted = conn.execute(
            "INSERT INTO cache (request_endpoint, request_payload, request_id, request_date, retry_count)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.endpoint,
                payload,
                record.request_id,
                record.request_date,
                record.retry_count,
            ],
        );

        match inserted {
            Ok(_) => record.cache_id = Some(conn.last_insert_rowid()),
            Err(err) => {
                tracing::warn!(endpoint = %record.endpoint, error = %err, "failed to persist request");
            },
        }
        record
    }

    /// Returns all pending requests in ascending retry-count order, so the
    /// requests that have failed the least are retried first.
    #[must_use]
    pub fn list_pending(&self) -> Vec<CachedRequest> {
        let Some(conn) = &self.conn else {
            return Vec::new();
        };
        let conn = conn.lock().unwrap();

        let rows = conn
            .prepare(
                "SELECT rowid, request_endpoint, request_payload, request_id, request_date, retry_count
                 FROM cache
                 ORDER BY retry_count ASC",
            )
            .and_then(|mut stmt| {
                stmt.query_map([], |row| {
                    let payload: String = row.get(2)?;
                    Ok(CachedRequest {
                        cache_id: Some(row.get(0)?),
                        endpoint: row.get(1)?,
                        parameters: parse_payload(&payload),
                        request_id: row.get(3)?,
                        request_date: row.get(4)?,
                        retry_count: row.get::<_, i64>(5)? as u32,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()
            });

        match rows {
            Ok(rows) => rows,
            Err(err) => {
                tracing::warn!(error = %err, "failed to read request cache");
                Vec::new()
            },
        }
    }

    /// Deletes a row. Idempotent: removing an already-gone row is a no-op,
    /// not an error.
    pub fn remove(&self, cache_id: i64) -> bool {
        let Some(conn) = &self.conn else {
            return false;
        };
        let conn = conn.lock().unwrap();
        match conn.execute("DELETE FROM cache WHERE rowid = ?1", params![cache_id]) {
            Ok(_) => true,
            Err(err) => {
                tracing::warn!(cache_id, error = %err, "failed to remove cached request");
                false
            },
        }
    }

    /// Atomically bumps the retry count for a row.
    pub fn increment_retry(&self, cache_id: i64) -> bool {
        let Some(conn) = &self.conn else {
            return false;
        };
        let conn = conn.lock().unwrap();
        match conn.execute(
            "UPDATE cache SET retry_count = retry_count + 1 WHERE rowid = ?1",
            params![cache_id],
        ) {
            Ok(updated) => updated > 0,
            Err(err) => {
                tracing::warn!(cache_id, error = %err, "failed to bump retry count");
                false
            },
        }
    }
}

/// A corrupted payload row still yields a record (with empty parameters)
/// rather than wedging the whole drain.
fn parse_payload(payload: &str) -> Map<String, Value> {
    match serde_json::from_str(payload) {
        Ok(Value::Object(parameters)) => parameters,
        Ok(_) | Err(_) => {
            tracing::warn!("cached request payload is not a JSON object; treating as empty");
            Map::new()
        },
    }
}
