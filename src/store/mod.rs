//! Local tags, collections and asset usage.
//!
//! These belong to the host application. The traits are the narrow view
//! the synchronizers need; `SqliteStore` is the bundled implementation.
//!
//! Asset rows and their usage counts come from outside: the host writes
//! them into `store.db`, or they are added one by one with the
//! `register-asset` subcommand.

pub mod schema;

use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalTag {
  pub id: i64,
  pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalCollection {
  pub id: i64,
  pub title: String,
}

/// A local asset and how often it is referenced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalAsset {
  pub id: String,
  pub label: String,
  /// Asset source the asset was imported from
  pub asset_source: String,
  /// Identifier of the asset at its source, e.g. `image-42`
  pub remote_identifier: String,
  pub usage_count: u64,
}

/// Find-or-create access to local tags and collections.
pub trait TagStore {
  fn find_tag_by_label(&self, label: &str) -> Result<Option<LocalTag>>;

  fn add_tag(&self, label: &str) -> Result<LocalTag>;

  fn find_collection_by_title(&self, title: &str) -> Result<Option<LocalCollection>>;

  fn add_collection(&self, title: &str) -> Result<LocalCollection>;

  fn collection_has_tag(&self, collection: &LocalCollection, tag: &LocalTag) -> Result<bool>;

  fn attach_tag(&self, collection: &LocalCollection, tag: &LocalTag) -> Result<()>;
}

/// Local assets together with their usage counts.
pub trait UsageSource {
  fn assets_of_source(&self, asset_source: &str) -> Result<Vec<LocalAsset>>;
}

/// SQLite-backed local store
pub struct SqliteStore {
  conn: Connection,
}

impl SqliteStore {
  /// Open or create the store at `path`
  pub fn open(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| Error::Store(format!("Failed to create store directory: {}", e)))?;
    }

    let conn = Connection::open(path).map_err(|e| {
      Error::Store(format!(
        "Failed to open store at {}: {}",
        path.display(),
        e
      ))
    })?;

    Self::with_connection(conn)
  }

  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| Error::Store(format!("Failed to open in-memory store: {}", e)))?;
    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    let store = Self { conn };
    store.run_migrations()?;
    Ok(store)
  }

  fn run_migrations(&self) -> Result<()> {
    self
      .conn
      .execute_batch(schema::SCHEMA)
      .map_err(|e| Error::Store(format!("Failed to run migrations: {}", e)))
  }

  /// Insert or update a local asset.
  pub fn upsert_asset(&self, asset: &LocalAsset) -> Result<()> {
    self
      .conn
      .execute(
        "INSERT OR REPLACE INTO assets (id, label, asset_source, remote_identifier, usage_count)
         VALUES (?, ?, ?, ?, ?)",
        params![
          asset.id,
          asset.label,
          asset.asset_source,
          asset.remote_identifier,
          asset.usage_count as i64
        ],
      )
      .map_err(|e| Error::Store(format!("Failed to store asset {}: {}", asset.id, e)))?;
    Ok(())
  }

  pub fn tag_count(&self) -> Result<u64> {
    self.count("SELECT COUNT(*) FROM tags")
  }

  pub fn collection_count(&self) -> Result<u64> {
    self.count("SELECT COUNT(*) FROM collections")
  }

  fn count(&self, sql: &str) -> Result<u64> {
    self
      .conn
      .query_row(sql, [], |row| row.get::<_, i64>(0))
      .map(|n| n as u64)
      .map_err(|e| Error::Store(format!("Failed to count: {}", e)))
  }
}

impl TagStore for SqliteStore {
  fn find_tag_by_label(&self, label: &str) -> Result<Option<LocalTag>> {
    self
      .conn
      .query_row(
        "SELECT id, label FROM tags WHERE label = ?",
        params![label],
        |row| {
          Ok(LocalTag {
            id: row.get(0)?,
            label: row.get(1)?,
          })
        },
      )
      .optional()
      .map_err(|e| Error::Store(format!("Failed to look up tag {}: {}", label, e)))
  }

  fn add_tag(&self, label: &str) -> Result<LocalTag> {
    self
      .conn
      .execute("INSERT INTO tags (label) VALUES (?)", params![label])
      .map_err(|e| Error::Store(format!("Failed to add tag {}: {}", label, e)))?;
    Ok(LocalTag {
      id: self.conn.last_insert_rowid(),
      label: label.to_string(),
    })
  }

  fn find_collection_by_title(&self, title: &str) -> Result<Option<LocalCollection>> {
    self
      .conn
      .query_row(
        "SELECT id, title FROM collections WHERE title = ?",
        params![title],
        |row| {
          Ok(LocalCollection {
            id: row.get(0)?,
            title: row.get(1)?,
          })
        },
      )
      .optional()
      .map_err(|e| Error::Store(format!("Failed to look up collection {}: {}", title, e)))
  }

  fn add_collection(&self, title: &str) -> Result<LocalCollection> {
    self
      .conn
      .execute("INSERT INTO collections (title) VALUES (?)", params![title])
      .map_err(|e| Error::Store(format!("Failed to add collection {}: {}", title, e)))?;
    Ok(LocalCollection {
      id: self.conn.last_insert_rowid(),
      title: title.to_string(),
    })
  }

  fn collection_has_tag(&self, collection: &LocalCollection, tag: &LocalTag) -> Result<bool> {
    self
      .conn
      .query_row(
        "SELECT 1 FROM collection_tags WHERE collection_id = ? AND tag_id = ?",
        params![collection.id, tag.id],
        |_| Ok(()),
      )
      .optional()
      .map(|row| row.is_some())
      .map_err(|e| Error::Store(format!("Failed to read collection tags: {}", e)))
  }

  fn attach_tag(&self, collection: &LocalCollection, tag: &LocalTag) -> Result<()> {
    self
      .conn
      .execute(
        "INSERT OR IGNORE INTO collection_tags (collection_id, tag_id) VALUES (?, ?)",
        params![collection.id, tag.id],
      )
      .map_err(|e| {
        Error::Store(format!(
          "Failed to attach tag {} to {}: {}",
          tag.label, collection.title, e
        ))
      })?;
    Ok(())
  }
}

impl UsageSource for SqliteStore {
  fn assets_of_source(&self, asset_source: &str) -> Result<Vec<LocalAsset>> {
    let mut stmt = self
      .conn
      .prepare(
        "SELECT id, label, asset_source, remote_identifier, usage_count FROM assets
         WHERE asset_source = ?
         ORDER BY label",
      )
      .map_err(|e| Error::Store(format!("Failed to prepare asset query: {}", e)))?;

    let assets = stmt
      .query_map(params![asset_source], |row| {
        Ok(LocalAsset {
          id: row.get(0)?,
          label: row.get(1)?,
          asset_source: row.get(2)?,
          remote_identifier: row.get(3)?,
          usage_count: row.get::<_, i64>(4)?.max(0) as u64,
        })
      })
      .map_err(|e| Error::Store(format!("Failed to query assets: {}", e)))?
      .collect::<std::result::Result<Vec<_>, _>>()
      .map_err(|e| Error::Store(format!("Failed to read asset row: {}", e)))?;

    Ok(assets)
  }
}
