//! Cache storage trait and SQLite implementation.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::traits::{CachedResponse, RequestIdentity};
use crate::error::{Error, Result};
use crate::net::Response;

/// Trait for cache storage backends.
///
/// Storage is partitioned into named generations. Entries are replaced wholesale
/// on re-store and never expire; deleting a generation is the only eviction.
pub trait CacheStorage: Send + Sync {
  /// Create the generation if it does not exist yet.
  fn open_generation(&self, name: &str) -> Result<()>;

  /// All generation names, oldest first.
  fn generation_names(&self) -> Result<Vec<String>>;

  /// Delete a generation with all its entries. Returns false if it did not exist.
  fn delete_generation(&self, name: &str) -> Result<bool>;

  /// Look up an entry in one generation.
  fn get(&self, generation: &str, request: &RequestIdentity) -> Result<Option<CachedResponse>>;

  /// Look up an entry in every generation, oldest generation first.
  fn match_any(&self, request: &RequestIdentity) -> Result<Option<CachedResponse>>;

  /// Store (or overwrite) an entry, creating the generation if needed.
  fn put(&self, generation: &str, request: &RequestIdentity, response: &Response) -> Result<()>;

  /// Store several entries atomically: either all are written or none.
  fn put_all(&self, generation: &str, entries: &[(RequestIdentity, Response)]) -> Result<()>;

  /// Number of entries held by a generation.
  fn entry_count(&self, generation: &str) -> Result<usize>;
}

/// Storage implementation that doesn't cache anything.
/// Used when caching is disabled - all operations are no-ops.
pub struct NoopStorage;

impl CacheStorage for NoopStorage {
  fn open_generation(&self, _name: &str) -> Result<()> {
    Ok(())
  }

  fn generation_names(&self) -> Result<Vec<String>> {
    Ok(Vec::new())
  }

  fn delete_generation(&self, _name: &str) -> Result<bool> {
    Ok(false)
  }

  fn get(&self, _generation: &str, _request: &RequestIdentity) -> Result<Option<CachedResponse>> {
    Ok(None) // Always miss
  }

  fn match_any(&self, _request: &RequestIdentity) -> Result<Option<CachedResponse>> {
    Ok(None) // Always miss
  }

  fn put(&self, _generation: &str, _request: &RequestIdentity, _response: &Response) -> Result<()> {
    Ok(()) // Discard
  }

  fn put_all(&self, _generation: &str, _entries: &[(RequestIdentity, Response)]) -> Result<()> {
    Ok(()) // Discard
  }

  fn entry_count(&self, _generation: &str) -> Result<usize> {
    Ok(0)
  }
}

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open the cache database at the default location.
  pub fn open_default() -> Result<Self> {
    Self::open(&Self::default_path()?)
  }

  /// Open or create a cache database at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }

    Self::with_connection(Connection::open(path)?)
  }

  /// Cache that lives only as long as the process.
  pub fn open_in_memory() -> Result<Self> {
    Self::with_connection(Connection::open_in_memory()?)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    conn.execute_batch(CACHE_SCHEMA)?;
    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| {
        Error::Io(std::io::Error::new(
          std::io::ErrorKind::NotFound,
          "Could not determine data directory",
        ))
      })?;

    Ok(data_dir.join("tasksync").join("cache.db"))
  }

  fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| Error::Poisoned(e.to_string()))
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
-- Named cache generations, in creation order
CREATE TABLE IF NOT EXISTS generations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Stored responses keyed by sha256(method + url)
CREATE TABLE IF NOT EXISTS response_cache (
    generation TEXT NOT NULL,
    request_hash TEXT NOT NULL,
    method TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (generation, request_hash)
);

CREATE INDEX IF NOT EXISTS idx_response_cache_hash ON response_cache(request_hash);
"#;

const SELECT_ENTRY: &str = "SELECT rc.generation, rc.status, rc.headers, rc.body, rc.cached_at
   FROM response_cache rc";

/// Raw column values; decoded outside the rusqlite row callback.
type RawEntry = (String, i64, String, Vec<u8>, String);

fn read_raw(row: &Row<'_>) -> rusqlite::Result<RawEntry> {
  Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn decode_entry(
  (generation, status, headers, body, cached_at): RawEntry,
) -> Result<CachedResponse> {
  let headers: Vec<(String, String)> = serde_json::from_str(&headers)?;
  let status = u16::try_from(status)
    .map_err(|_| Error::Decode(format!("stored status {} out of range", status)))?;
  Ok(CachedResponse {
    response: Response {
      status,
      headers,
      body,
    },
    generation,
    cached_at: parse_datetime(&cached_at)?,
  })
}

fn ensure_generation(conn: &Connection, name: &str) -> Result<()> {
  conn.execute(
    "INSERT OR IGNORE INTO generations (name) VALUES (?)",
    params![name],
  )?;
  Ok(())
}

fn insert_entry(
  conn: &Connection,
  generation: &str,
  request: &RequestIdentity,
  response: &Response,
) -> Result<()> {
  let headers = serde_json::to_string(&response.headers)?;
  conn.execute(
    "INSERT OR REPLACE INTO response_cache
       (generation, request_hash, method, url, status, headers, body, cached_at)
     VALUES (?, ?, ?, ?, ?, ?, ?, datetime('now'))",
    params![
      generation,
      request.cache_hash(),
      request.method(),
      request.url(),
      response.status,
      headers,
      response.body
    ],
  )?;
  Ok(())
}

impl CacheStorage for SqliteStorage {
  fn open_generation(&self, name: &str) -> Result<()> {
    let conn = self.conn()?;
    ensure_generation(&conn, name)
  }

  fn generation_names(&self) -> Result<Vec<String>> {
    let conn = self.conn()?;
    let mut stmt = conn.prepare("SELECT name FROM generations ORDER BY id")?;
    let names = stmt
      .query_map([], |row| row.get(0))?
      .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(names)
  }

  fn delete_generation(&self, name: &str) -> Result<bool> {
    let mut conn = self.conn()?;
    let tx = conn.transaction()?;
    tx.execute(
      "DELETE FROM response_cache WHERE generation = ?",
      params![name],
    )?;
    let removed = tx.execute("DELETE FROM generations WHERE name = ?", params![name])?;
    tx.commit()?;
    Ok(removed > 0)
  }

  fn get(&self, generation: &str, request: &RequestIdentity) -> Result<Option<CachedResponse>> {
    let conn = self.conn()?;
    let raw = conn
      .query_row(
        &format!(
          "{} WHERE rc.generation = ? AND rc.request_hash = ?",
          SELECT_ENTRY
        ),
        params![generation, request.cache_hash()],
        read_raw,
      )
      .optional()?;
    raw.map(decode_entry).transpose()
  }

  fn match_any(&self, request: &RequestIdentity) -> Result<Option<CachedResponse>> {
    let conn = self.conn()?;
    let raw = conn
      .query_row(
        &format!(
          "{} INNER JOIN generations g ON g.name = rc.generation
           WHERE rc.request_hash = ?
           ORDER BY g.id LIMIT 1",
          SELECT_ENTRY
        ),
        params![request.cache_hash()],
        read_raw,
      )
      .optional()?;
    raw.map(decode_entry).transpose()
  }

  fn put(&self, generation: &str, request: &RequestIdentity, response: &Response) -> Result<()> {
    let mut conn = self.conn()?;
    let tx = conn.transaction()?;
    ensure_generation(&tx, generation)?;
    insert_entry(&tx, generation, request, response)?;
    tx.commit()?;
    Ok(())
  }

  fn put_all(&self, generation: &str, entries: &[(RequestIdentity, Response)]) -> Result<()> {
    let mut conn = self.conn()?;
    let tx = conn.transaction()?;
    ensure_generation(&tx, generation)?;
    for (request, response) in entries {
      insert_entry(&tx, generation, request, response)?;
    }
    tx.commit()?;
    Ok(())
  }

  fn entry_count(&self, generation: &str) -> Result<usize> {
    let conn = self.conn()?;
    let count: i64 = conn.query_row(
      "SELECT COUNT(*) FROM response_cache WHERE generation = ?",
      params![generation],
      |row| row.get(0),
    )?;
    Ok(count as usize)
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| Error::Decode(format!("Failed to parse datetime '{}': {}", s, e)))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn identity(path: &str) -> RequestIdentity {
    RequestIdentity::new("GET", &format!("http://localhost:5000{}", path))
  }

  #[test]
  fn test_put_then_get() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    let id = identity("/index.html");
    storage
      .put("static", &id, &Response::new(200, "<html>"))
      .unwrap();

    let hit = storage.get("static", &id).unwrap().unwrap();
    assert_eq!(hit.response.body, b"<html>");
    assert_eq!(hit.generation, "static");
    assert!(storage.get("api", &id).unwrap().is_none());
  }

  #[test]
  fn test_put_overwrites_entry() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    let id = identity("/api/tasks");
    storage.put("api", &id, &Response::new(200, "[1]")).unwrap();
    storage.put("api", &id, &Response::new(200, "[1,2]")).unwrap();

    assert_eq!(storage.entry_count("api").unwrap(), 1);
    let hit = storage.get("api", &id).unwrap().unwrap();
    assert_eq!(hit.response.body, b"[1,2]");
  }

  #[test]
  fn test_match_any_prefers_oldest_generation() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    let id = identity("/app.js");
    storage.open_generation("static").unwrap();
    storage.open_generation("api").unwrap();
    storage.put("api", &id, &Response::new(200, "api")).unwrap();
    storage.put("static", &id, &Response::new(200, "static")).unwrap();

    let hit = storage.match_any(&id).unwrap().unwrap();
    assert_eq!(hit.generation, "static");
  }

  #[test]
  fn test_delete_generation_drops_entries() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    let id = identity("/index.html");
    storage.put("static-v0", &id, &Response::new(200, "old")).unwrap();

    assert!(storage.delete_generation("static-v0").unwrap());
    assert!(!storage.delete_generation("static-v0").unwrap());
    assert!(storage.match_any(&id).unwrap().is_none());
    assert!(storage.generation_names().unwrap().is_empty());
  }

  #[test]
  fn test_headers_survive_storage() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    let id = identity("/api/tasks");
    let response = Response::json_body(200, &serde_json::json!([]));
    storage.put("api", &id, &response).unwrap();

    let hit = storage.get("api", &id).unwrap().unwrap();
    assert_eq!(hit.response, response);
  }

  #[test]
  fn test_on_disk_cache_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("cache.db");
    let id = identity("/index.html");

    {
      let storage = SqliteStorage::open(&path).unwrap();
      storage.put("static", &id, &Response::new(200, "shell")).unwrap();
    }

    let storage = SqliteStorage::open(&path).unwrap();
    assert_eq!(storage.generation_names().unwrap(), vec!["static".to_string()]);
    assert!(storage.get("static", &id).unwrap().is_some());
  }

  #[test]
  fn test_noop_storage_always_misses() {
    let storage = NoopStorage;
    let id = identity("/index.html");
    storage.put("static", &id, &Response::new(200, "x")).unwrap();
    assert!(storage.match_any(&id).unwrap().is_none());
    assert!(storage.generation_names().unwrap().is_empty());
  }
}
