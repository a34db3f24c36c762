//! Response cache trait and SQLite implementation.

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::error::{Error, Result};

/// Key → serialized value store with explicit flush.
///
/// Values are opaque snapshots; callers serialize and parse them.
pub trait ResponseCache: Send + Sync {
  fn get(&self, key: &str) -> Result<Option<String>>;

  fn set(&self, key: &str, value: &str, tags: &[&str]) -> Result<()>;

  fn remove(&self, key: &str) -> Result<()>;

  /// Drop every entry of this cache.
  fn flush(&self) -> Result<()>;

  /// Drop every entry that was stored with `tag`.
  fn flush_by_tag(&self, tag: &str) -> Result<()>;
}

/// Storage implementation that doesn't cache anything.
/// Used when caching is disabled - all operations are no-ops.
pub struct NoopStorage;

impl ResponseCache for NoopStorage {
  fn get(&self, _key: &str) -> Result<Option<String>> {
    Ok(None) // Always miss
  }

  fn set(&self, _key: &str, _value: &str, _tags: &[&str]) -> Result<()> {
    Ok(()) // Discard
  }

  fn remove(&self, _key: &str) -> Result<()> {
    Ok(())
  }

  fn flush(&self) -> Result<()> {
    Ok(())
  }

  fn flush_by_tag(&self, _tag: &str) -> Result<()> {
    Ok(())
  }
}

/// SQLite-backed cache.
///
/// Several namespaces share one database file; each `SqliteStorage`
/// only sees and flushes its own namespace.
pub struct SqliteStorage {
  conn: Arc<Mutex<Connection>>,
  namespace: &'static str,
  lifetime: Duration,
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS response_cache (
    namespace TEXT NOT NULL,
    cache_key TEXT NOT NULL,
    data TEXT NOT NULL,
    tags TEXT NOT NULL DEFAULT '',
    cached_at TEXT NOT NULL,
    PRIMARY KEY (namespace, cache_key)
);
"#;

impl SqliteStorage {
  /// Open (or create) the cache database at `path`.
  pub fn open(path: &Path, namespace: &'static str, lifetime: Duration) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| Error::Cache(format!("Failed to create cache directory: {}", e)))?;
    }

    let conn = Connection::open(path).map_err(|e| {
      Error::Cache(format!(
        "Failed to open cache database at {}: {}",
        path.display(),
        e
      ))
    })?;

    Self::with_connection(Arc::new(Mutex::new(conn)), namespace, lifetime)
  }

  pub fn open_in_memory(namespace: &'static str, lifetime: Duration) -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| Error::Cache(format!("Failed to open in-memory cache: {}", e)))?;
    Self::with_connection(Arc::new(Mutex::new(conn)), namespace, lifetime)
  }

  /// A second namespace on the same database connection.
  pub fn sibling(&self, namespace: &'static str) -> Self {
    Self {
      conn: Arc::clone(&self.conn),
      namespace,
      lifetime: self.lifetime,
    }
  }

  fn with_connection(
    conn: Arc<Mutex<Connection>>,
    namespace: &'static str,
    lifetime: Duration,
  ) -> Result<Self> {
    let storage = Self {
      conn,
      namespace,
      lifetime,
    };
    storage.run_migrations()?;
    Ok(storage)
  }

  fn run_migrations(&self) -> Result<()> {
    let conn = self.lock()?;
    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| Error::Cache(format!("Failed to run cache migrations: {}", e)))
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| Error::Cache(format!("Lock poisoned: {}", e)))
  }

  fn is_expired(&self, cached_at: DateTime<Utc>) -> bool {
    Utc::now() - cached_at > self.lifetime
  }
}

impl ResponseCache for SqliteStorage {
  fn get(&self, key: &str) -> Result<Option<String>> {
    let conn = self.lock()?;

    let mut stmt = conn
      .prepare(
        "SELECT data, cached_at FROM response_cache
         WHERE namespace = ? AND cache_key = ?",
      )
      .map_err(|e| Error::Cache(format!("Failed to prepare query: {}", e)))?;

    let row: Option<(String, String)> = stmt
      .query_row(params![self.namespace, key], |row| {
        Ok((row.get(0)?, row.get(1)?))
      })
      .optional()
      .map_err(|e| Error::Cache(format!("Failed to read entry: {}", e)))?;

    let Some((data, cached_at)) = row else {
      debug!(namespace = self.namespace, key, "cache miss");
      return Ok(None);
    };

    if self.is_expired(parse_datetime(&cached_at)?) {
      debug!(namespace = self.namespace, key, "cache entry expired");
      conn
        .execute(
          "DELETE FROM response_cache WHERE namespace = ? AND cache_key = ?",
          params![self.namespace, key],
        )
        .map_err(|e| Error::Cache(format!("Failed to evict entry: {}", e)))?;
      return Ok(None);
    }

    debug!(namespace = self.namespace, key, "cache hit");
    Ok(Some(data))
  }

  fn set(&self, key: &str, value: &str, tags: &[&str]) -> Result<()> {
    let conn = self.lock()?;
    conn
      .execute(
        "INSERT OR REPLACE INTO response_cache (namespace, cache_key, data, tags, cached_at)
         VALUES (?, ?, ?, ?, ?)",
        params![
          self.namespace,
          key,
          value,
          tags.join(","),
          format_datetime(Utc::now())
        ],
      )
      .map_err(|e| Error::Cache(format!("Failed to store entry: {}", e)))?;
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<()> {
    let conn = self.lock()?;
    conn
      .execute(
        "DELETE FROM response_cache WHERE namespace = ? AND cache_key = ?",
        params![self.namespace, key],
      )
      .map_err(|e| Error::Cache(format!("Failed to remove entry: {}", e)))?;
    Ok(())
  }

  fn flush(&self) -> Result<()> {
    let conn = self.lock()?;
    let removed = conn
      .execute(
        "DELETE FROM response_cache WHERE namespace = ?",
        params![self.namespace],
      )
      .map_err(|e| Error::Cache(format!("Failed to flush cache: {}", e)))?;
    debug!(namespace = self.namespace, removed, "cache flushed");
    Ok(())
  }

  fn flush_by_tag(&self, tag: &str) -> Result<()> {
    let conn = self.lock()?;
    // Tags are stored comma-joined; pad both sides so a tag only matches whole.
    conn
      .execute(
        "DELETE FROM response_cache
         WHERE namespace = ? AND instr(',' || tags || ',', ',' || ? || ',') > 0",
        params![self.namespace, tag],
      )
      .map_err(|e| Error::Cache(format!("Failed to flush tag {}: {}", tag, e)))?;
    Ok(())
  }
}

fn format_datetime(dt: DateTime<Utc>) -> String {
  dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| Error::Cache(format!("Failed to parse datetime '{}': {}", s, e)))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn storage() -> SqliteStorage {
    SqliteStorage::open_in_memory("test", Duration::hours(1)).unwrap()
  }

  #[test]
  fn test_set_then_get() {
    let cache = storage();
    assert_eq!(cache.get("a").unwrap(), None);

    cache.set("a", "{\"x\":1}", &[]).unwrap();
    assert_eq!(cache.get("a").unwrap().as_deref(), Some("{\"x\":1}"));
  }

  #[test]
  fn test_set_overwrites() {
    let cache = storage();
    cache.set("a", "1", &[]).unwrap();
    cache.set("a", "2", &[]).unwrap();
    assert_eq!(cache.get("a").unwrap().as_deref(), Some("2"));
  }

  #[test]
  fn test_flush_only_clears_own_namespace() {
    let assets = storage();
    let counts = assets.sibling("counts");

    assets.set("a", "1", &[]).unwrap();
    counts.set("a", "7", &[]).unwrap();

    assets.flush().unwrap();
    assert_eq!(assets.get("a").unwrap(), None);
    assert_eq!(counts.get("a").unwrap().as_deref(), Some("7"));
  }

  #[test]
  fn test_flush_by_tag_matches_whole_tags() {
    let cache = storage();
    cache.set("a", "1", &["tag_count"]).unwrap();
    cache.set("b", "2", &["asset", "tag_count_extra"]).unwrap();
    cache.set("c", "3", &["asset"]).unwrap();

    cache.flush_by_tag("tag_count").unwrap();
    assert_eq!(cache.get("a").unwrap(), None);
    assert_eq!(cache.get("b").unwrap().as_deref(), Some("2"));
    assert_eq!(cache.get("c").unwrap().as_deref(), Some("3"));
  }

  #[test]
  fn test_remove() {
    let cache = storage();
    cache.set("a", "1", &[]).unwrap();
    cache.remove("a").unwrap();
    assert_eq!(cache.get("a").unwrap(), None);
  }

  #[test]
  fn test_expired_entry_is_a_miss() {
    let cache = SqliteStorage::open_in_memory("test", Duration::seconds(-1)).unwrap();
    cache.set("a", "1", &[]).unwrap();
    assert_eq!(cache.get("a").unwrap(), None);
  }

  #[test]
  fn test_noop_storage_always_misses() {
    let cache = NoopStorage;
    cache.set("a", "1", &[]).unwrap();
    assert_eq!(cache.get("a").unwrap(), None);
  }
}
