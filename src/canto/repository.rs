//! Repository-style access to Canto assets with per-record caching.

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::cache::ResponseCache;
use crate::error::{Error, Result};
use crate::query::{AssetQuery, AssetQueryResult};

use super::cache::{CantoCacheKey, TAG_COUNT_TAG};
use super::client::CantoClient;
use super::types::{AssetRecord, AssetTypeFilter, OrderBy, QuerySpec, TagCount};

/// Builds asset queries and resolves single assets.
///
/// The type filter, ordering and collection scope set here are defaults
/// for every query built afterwards. Each query snapshots them into its
/// own [`QuerySpec`], so changing a default never affects a result that
/// already exists.
pub struct AssetRepository {
  client: Arc<dyn CantoClient>,
  asset_cache: Arc<dyn ResponseCache>,
  count_cache: Arc<dyn ResponseCache>,
  type_filter: AssetTypeFilter,
  orderings: Vec<OrderBy>,
  collection: Option<String>,
}

impl AssetRepository {
  pub fn new(
    client: Arc<dyn CantoClient>,
    asset_cache: Arc<dyn ResponseCache>,
    count_cache: Arc<dyn ResponseCache>,
  ) -> Self {
    Self {
      client,
      asset_cache,
      count_cache,
      type_filter: AssetTypeFilter::All,
      orderings: Vec::new(),
      collection: None,
    }
  }

  pub fn client(&self) -> Arc<dyn CantoClient> {
    Arc::clone(&self.client)
  }

  pub fn order_by(&mut self, orderings: Vec<OrderBy>) {
    self.orderings = orderings;
  }

  /// `None` resets to `All`.
  pub fn filter_by_type(&mut self, filter: Option<AssetTypeFilter>) {
    self.type_filter = filter.unwrap_or_default();
  }

  pub fn filter_by_collection(&mut self, collection: Option<String>) {
    self.collection = collection;
  }

  /// The current defaults as an explicit spec.
  pub fn query_spec(&self) -> QuerySpec {
    QuerySpec {
      type_filter: self.type_filter,
      orderings: self.orderings.clone(),
      collection: self.collection.clone(),
      ..QuerySpec::default()
    }
  }

  fn query(&self) -> AssetQuery {
    AssetQuery::with_spec(self.client(), self.query_spec())
  }

  /// Run an explicit spec, ignoring the repository defaults.
  pub fn find(&self, spec: QuerySpec) -> AssetQueryResult {
    AssetQuery::with_spec(self.client(), spec).execute()
  }

  pub fn find_all(&self) -> AssetQueryResult {
    self.query().execute()
  }

  pub fn find_by_search_term(&self, term: &str) -> AssetQueryResult {
    self.query().search_term(term).execute()
  }

  pub fn find_by_tag(&self, label: &str) -> AssetQueryResult {
    self.query().tag(label).execute()
  }

  pub fn find_untagged(&self) -> AssetQueryResult {
    self.query().untagged().execute()
  }

  pub fn find_by_collection(&self, collection: &str) -> AssetQueryResult {
    self.query().collection(collection).execute()
  }

  pub async fn count_all(&self) -> Result<u64> {
    self.query().count().await
  }

  pub async fn count_untagged(&self) -> Result<u64> {
    self.query().untagged().count().await
  }

  /// Number of assets carrying `label`, cached per label.
  ///
  /// Auth and transport failures yield [`TagCount::Unknown`] instead of
  /// an error; cache failures still propagate.
  pub async fn count_by_tag(&self, label: &str) -> Result<TagCount> {
    let key = CantoCacheKey::TagCount {
      label: label.to_string(),
    };
    let cache_key = key.cache_key();

    if let Some(cached) = self.count_cache.get(&cache_key)? {
      match cached.parse::<u64>() {
        Ok(count) => return Ok(TagCount::Known(count)),
        Err(_) => warn!(label, "discarding unreadable cached tag count"),
      }
    }

    match self.find_by_tag(label).count().await {
      Ok(count) => {
        self
          .count_cache
          .set(&cache_key, &count.to_string(), &[key.tag()])?;
        Ok(TagCount::Known(count))
      }
      Err(e) if e.is_remote_failure() => {
        warn!(label, error = %e, "tag count unavailable");
        Ok(TagCount::Unknown)
      }
      Err(e) => Err(e),
    }
  }

  /// Resolve one asset, from cache if possible.
  ///
  /// On a miss the raw payload is fetched, parsed and only then written
  /// to the cache. Every failure propagates.
  pub async fn get_by_identifier(&self, identifier: &str) -> Result<AssetRecord> {
    let key = CantoCacheKey::Asset {
      identifier: identifier.to_string(),
    };
    let cache_key = key.cache_key();

    if let Some(cached) = self.asset_cache.get(&cache_key)? {
      match serde_json::from_str::<Value>(&cached)
        .map_err(|e| Error::Cache(e.to_string()))
        .and_then(|raw| parse_asset(identifier, &raw))
      {
        Ok(record) => return Ok(record),
        Err(e) => {
          warn!(identifier, error = %e, "evicting unreadable cache entry");
          self.asset_cache.remove(&cache_key)?;
        }
      }
    }

    let raw = self.client.get_file(identifier).await?;
    let record = parse_asset(identifier, &raw)?;
    self
      .asset_cache
      .set(&cache_key, &raw.to_string(), &[key.tag()])?;
    debug!(identifier, "asset fetched and cached");

    Ok(record)
  }

  /// Drop the cached record of one asset, e.g. after writing to it.
  pub fn forget(&self, identifier: &str) -> Result<()> {
    let key = CantoCacheKey::Asset {
      identifier: identifier.to_string(),
    };
    self.asset_cache.remove(&key.cache_key())
  }

  /// Drop every cached asset record.
  pub fn flush_asset_cache(&self) -> Result<()> {
    self.asset_cache.flush()
  }

  /// Drop every cached per-tag count.
  pub fn flush_tag_counts(&self) -> Result<()> {
    self.count_cache.flush_by_tag(TAG_COUNT_TAG)
  }
}

/// A payload that is not an asset object, or lacks what an asset needs,
/// means the asset was not found.
fn parse_asset(identifier: &str, raw: &Value) -> Result<AssetRecord> {
  if !raw.is_object() {
    return Err(Error::AssetNotFound(identifier.to_string()));
  }
  AssetRecord::from_json(raw).map_err(|e| match e {
    Error::Parse { message, .. } => Error::AssetNotFound(format!("{}: {}", identifier, message)),
    other => other,
  })
}
