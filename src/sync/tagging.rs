//! Keeps the "in use" marker tag on Canto records in line with local usage.

use tracing::{debug, info, warn};

use crate::canto::client::FileUpdate;
use crate::canto::repository::AssetRepository;
use crate::canto::types::AssetRecord;
use crate::error::Result;
use crate::store::{LocalAsset, UsageSource};

use super::BatchSummary;

/// What happened to one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagOutcome {
  /// Marker added remotely
  Tagged,
  /// In use and the marker was already there
  AlreadyTagged,
  /// Marker removed remotely
  Removed,
  /// Not in use and no marker present
  AlreadyRemoved,
  /// Record could not be resolved or updated
  Failed(String),
}

/// One processed local asset.
#[derive(Debug, Clone)]
pub struct TagSyncItem {
  pub asset: LocalAsset,
  pub outcome: TagOutcome,
}

/// Tag set a record should carry, sorted and without duplicates.
pub fn desired_tags(current: &[String], in_use: bool, marker: &str) -> Vec<String> {
  let mut tags: Vec<String> = current
    .iter()
    .filter(|t| in_use || t.as_str() != marker)
    .cloned()
    .collect();
  if in_use {
    tags.push(marker.to_string());
  }
  tags.sort();
  tags.dedup();
  tags
}

/// Applies the in-use marker to Canto records.
pub struct TaggingSynchronizer<'a> {
  repository: &'a AssetRepository,
  marker: String,
}

impl<'a> TaggingSynchronizer<'a> {
  pub fn new(repository: &'a AssetRepository, marker: impl Into<String>) -> Self {
    Self {
      repository,
      marker: marker.into(),
    }
  }

  /// Bring one record's tags in line with `in_use`. Writes to Canto only
  /// when the sorted tag list actually changes.
  pub async fn synchronize(&self, record: &AssetRecord, in_use: bool) -> Result<TagOutcome> {
    let mut current = record.tags.clone();
    current.sort();
    let desired = desired_tags(&current, in_use, &self.marker);

    if desired == current {
      return Ok(if in_use {
        TagOutcome::AlreadyTagged
      } else {
        TagOutcome::AlreadyRemoved
      });
    }

    let update = FileUpdate {
      keywords: desired.join(","),
    };
    self
      .repository
      .client()
      .update_file(&record.identifier, &update)
      .await?;
    debug!(identifier = %record.identifier, keywords = %update.keywords, "tags updated");
    if let Err(e) = self.repository.forget(&record.identifier) {
      warn!(identifier = %record.identifier, error = %e, "could not evict updated asset");
    }

    Ok(if in_use {
      TagOutcome::Tagged
    } else {
      TagOutcome::Removed
    })
  }

  /// Synchronize every local asset of `asset_source`.
  ///
  /// The asset cache is flushed first so decisions rest on live tags.
  /// Per-asset failures are reported through `on_item` and skipped; only
  /// failures to read local assets or to flush the asset cache up front
  /// abort the run. Dropping the tag counts afterwards is best effort.
  pub async fn run(
    &self,
    usage: &dyn UsageSource,
    asset_source: &str,
    mut on_item: impl FnMut(&TagSyncItem),
  ) -> Result<BatchSummary> {
    self.repository.flush_asset_cache()?;
    let assets = usage.assets_of_source(asset_source)?;
    info!(asset_source, count = assets.len(), "synchronizing in-use tags");

    let mut summary = BatchSummary::default();
    for asset in assets {
      let outcome = match self.process(&asset).await {
        Ok(outcome) => outcome,
        Err(e) => {
          warn!(identifier = %asset.remote_identifier, error = %e, "skipping asset");
          TagOutcome::Failed(e.to_string())
        }
      };

      summary.record(matches!(outcome, TagOutcome::Failed(_)));
      on_item(&TagSyncItem { asset, outcome });
    }

    if let Err(e) = self.repository.flush_tag_counts() {
      warn!(error = %e, "could not flush cached tag counts");
    }
    Ok(summary)
  }

  async fn process(&self, asset: &LocalAsset) -> Result<TagOutcome> {
    let record = self
      .repository
      .get_by_identifier(&asset.remote_identifier)
      .await?;
    self.synchronize(&record, asset.usage_count > 0).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::testing::FailingCache;
  use crate::cache::{NoopStorage, SqliteStorage};
  use crate::canto::api_types::tests::sample_asset;
  use crate::canto::cache::{ASSET_NAMESPACE, COUNT_NAMESPACE};
  use crate::canto::testing::{FailMode, FakeCantoClient};
  use crate::store::SqliteStore;
  use chrono::Duration;
  use std::sync::Arc;

  fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
  }

  fn repository(client: Arc<FakeCantoClient>) -> AssetRepository {
    let assets = SqliteStorage::open_in_memory(ASSET_NAMESPACE, Duration::hours(1)).unwrap();
    let counts = assets.sibling(COUNT_NAMESPACE);
    AssetRepository::new(client, Arc::new(assets), Arc::new(counts))
  }

  fn record(tags: &[&str]) -> AssetRecord {
    AssetRecord::from_json(&sample_asset("image", "42", "photo.jpg", tags)).unwrap()
  }

  #[test]
  fn test_desired_tags() {
    assert_eq!(
      desired_tags(&strings(&["b", "a"]), true, "used"),
      strings(&["a", "b", "used"])
    );
    assert_eq!(
      desired_tags(&strings(&["a", "used"]), false, "used"),
      strings(&["a"])
    );
    assert_eq!(desired_tags(&strings(&["a"]), false, "used"), strings(&["a"]));
    assert_eq!(
      desired_tags(&strings(&["used", "a", "used"]), true, "used"),
      strings(&["a", "used"])
    );
  }

  #[tokio::test]
  async fn test_in_use_adds_marker_once() {
    let client = Arc::new(FakeCantoClient::new());
    let repo = repository(client.clone());
    let sync = TaggingSynchronizer::new(&repo, "used");

    let outcome = sync.synchronize(&record(&["a", "b"]), true).await.unwrap();
    assert_eq!(outcome, TagOutcome::Tagged);

    let updates = client.updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].0, "image-42");
    assert_eq!(updates[0].1.keywords, "a,b,used");
  }

  #[tokio::test]
  async fn test_in_use_with_marker_is_noop() {
    let client = Arc::new(FakeCantoClient::new());
    let repo = repository(client.clone());
    let sync = TaggingSynchronizer::new(&repo, "used");

    let outcome = sync
      .synchronize(&record(&["a", "b", "used"]), true)
      .await
      .unwrap();
    assert_eq!(outcome, TagOutcome::AlreadyTagged);
    assert!(client.updates().is_empty());
  }

  #[tokio::test]
  async fn test_not_in_use_removes_marker() {
    let client = Arc::new(FakeCantoClient::new());
    let repo = repository(client.clone());
    let sync = TaggingSynchronizer::new(&repo, "used");

    let outcome = sync.synchronize(&record(&["a", "used"]), false).await.unwrap();
    assert_eq!(outcome, TagOutcome::Removed);
    let updates = client.updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].1.keywords, "a");
  }

  #[tokio::test]
  async fn test_not_in_use_without_marker_is_noop() {
    let client = Arc::new(FakeCantoClient::new());
    let repo = repository(client.clone());
    let sync = TaggingSynchronizer::new(&repo, "used");

    let outcome = sync.synchronize(&record(&["a"]), false).await.unwrap();
    assert_eq!(outcome, TagOutcome::AlreadyRemoved);
    assert!(client.updates().is_empty());
  }

  #[tokio::test]
  async fn test_unsorted_remote_tags_do_not_force_a_write() {
    let client = Arc::new(FakeCantoClient::new());
    let repo = repository(client.clone());
    let sync = TaggingSynchronizer::new(&repo, "used");

    sync
      .synchronize(&record(&["used", "b", "a"]), true)
      .await
      .unwrap();
    assert!(client.updates().is_empty());
  }

  fn local(id: &str, remote: &str, usage_count: u64) -> LocalAsset {
    LocalAsset {
      id: id.to_string(),
      label: format!("{}.jpg", id),
      asset_source: "canto".to_string(),
      remote_identifier: remote.to_string(),
      usage_count,
    }
  }

  #[tokio::test]
  async fn test_run_skips_unresolvable_assets_and_continues() {
    let client = Arc::new(
      FakeCantoClient::new()
        .with_file("image-1", sample_asset("image", "1", "a.jpg", &["x"]))
        .with_file("image-3", sample_asset("image", "3", "c.jpg", &["used"])),
    );
    let repo = repository(client.clone());

    let store = SqliteStore::open_in_memory().unwrap();
    store.upsert_asset(&local("a", "image-1", 3)).unwrap();
    store.upsert_asset(&local("b", "image-2", 1)).unwrap();
    store.upsert_asset(&local("c", "image-3", 0)).unwrap();
    store.upsert_asset(&LocalAsset {
      asset_source: "local".to_string(),
      ..local("d", "image-4", 1)
    })
    .unwrap();

    let sync = TaggingSynchronizer::new(&repo, "used");
    let mut items = Vec::new();
    let summary = sync
      .run(&store, "canto", |item| items.push(item.clone()))
      .await
      .unwrap();

    assert_eq!(summary.processed, 3);
    assert_eq!(summary.failed, 1);
    assert_eq!(items[0].outcome, TagOutcome::Tagged);
    assert!(matches!(items[1].outcome, TagOutcome::Failed(_)));
    assert_eq!(items[2].outcome, TagOutcome::Removed);

    // Second run sees the written tags and changes nothing
    let before = client.updates().len();
    let summary = sync.run(&store, "canto", |_| {}).await.unwrap();
    assert_eq!(summary.failed, 1);
    assert_eq!(client.updates().len(), before);
  }

  #[tokio::test]
  async fn test_run_flushes_stale_cache_first() {
    let client = Arc::new(
      FakeCantoClient::new().with_file("image-1", sample_asset("image", "1", "a.jpg", &[])),
    );
    let repo = repository(client.clone());
    repo.get_by_identifier("image-1").await.unwrap();

    let store = SqliteStore::open_in_memory().unwrap();
    store.upsert_asset(&local("a", "image-1", 1)).unwrap();

    TaggingSynchronizer::new(&repo, "used")
      .run(&store, "canto", |_| {})
      .await
      .unwrap();
    assert_eq!(client.get_file_calls(), 2);
  }

  #[tokio::test]
  async fn test_eviction_failure_keeps_outcome() {
    let client = Arc::new(FakeCantoClient::new());
    let repo = AssetRepository::new(
      client.clone(),
      Arc::new(FailingCache {
        fail_remove: true,
        ..FailingCache::default()
      }),
      Arc::new(NoopStorage),
    );
    let sync = TaggingSynchronizer::new(&repo, "used");

    let outcome = sync.synchronize(&record(&["a"]), true).await.unwrap();
    assert_eq!(outcome, TagOutcome::Tagged);
    assert_eq!(client.updates().len(), 1);
  }

  #[tokio::test]
  async fn test_run_survives_tag_count_flush_failure() {
    let client = Arc::new(
      FakeCantoClient::new().with_file("image-1", sample_asset("image", "1", "a.jpg", &[])),
    );
    let repo = AssetRepository::new(
      client.clone(),
      Arc::new(NoopStorage),
      Arc::new(FailingCache {
        fail_flush_by_tag: true,
        ..FailingCache::default()
      }),
    );
    let store = SqliteStore::open_in_memory().unwrap();
    store.upsert_asset(&local("a", "image-1", 1)).unwrap();

    let mut items = Vec::new();
    let summary = TaggingSynchronizer::new(&repo, "used")
      .run(&store, "canto", |item| items.push(item.clone()))
      .await
      .unwrap();
    assert_eq!(summary.processed, 1);
    assert_eq!(items[0].outcome, TagOutcome::Tagged);
    assert_eq!(client.updates().len(), 1);
  }

  #[tokio::test]
  async fn test_update_failure_propagates() {
    let client = Arc::new(
      FakeCantoClient::new().with_file("image-1", sample_asset("image", "1", "a.jpg", &[])),
    );
    let repo = repository(client.clone());
    let record = repo.get_by_identifier("image-1").await.unwrap();

    client.fail(Some(FailMode::Connection));
    let sync = TaggingSynchronizer::new(&repo, "used");
    assert!(sync.synchronize(&record, true).await.is_err());
  }
}
