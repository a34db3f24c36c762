//! Asset queries against the Canto search API.
//!
//! An [`AssetQuery`] is configured builder-style and then either counted
//! or executed. [`AssetQueryResult`] wraps one query and fetches its
//! records lazily: the first access to an element runs the search once,
//! after which the records stay fixed for the lifetime of the result.
//!
//! # Example
//!
//! ```ignore
//! let mut result = AssetQuery::new(client)
//!   .search_term("sunset")
//!   .type_filter(AssetTypeFilter::Image)
//!   .execute();
//!
//! // Only asks Canto for the number of matches
//! let total = result.count().await?;
//!
//! // Fetches the page once, then walks it
//! while let Some(asset) = result.next_asset().await? {
//!   println!("{}", asset.label);
//! }
//! ```
//!
//! An `AssetQueryResult` is not meant to be shared between tasks; wrap it
//! in a mutex if that is ever needed.

use std::sync::Arc;
use tracing::debug;

use crate::canto::client::{CantoClient, SearchRequest};
use crate::canto::types::{AssetRecord, AssetTypeFilter, OrderBy, QuerySpec};
use crate::error::Result;

/// A search against Canto, built from a [`QuerySpec`].
#[derive(Clone)]
pub struct AssetQuery {
  client: Arc<dyn CantoClient>,
  spec: QuerySpec,
}

impl AssetQuery {
  pub fn new(client: Arc<dyn CantoClient>) -> Self {
    Self::with_spec(client, QuerySpec::default())
  }

  pub fn with_spec(client: Arc<dyn CantoClient>, mut spec: QuerySpec) -> Self {
    spec.limit = spec.limit.max(1);
    Self { client, spec }
  }

  pub fn search_term(mut self, term: impl Into<String>) -> Self {
    self.spec.search_term = term.into();
    self
  }

  pub fn type_filter(mut self, filter: AssetTypeFilter) -> Self {
    self.spec.type_filter = filter;
    self
  }

  pub fn tag(mut self, label: impl Into<String>) -> Self {
    self.spec.tag = Some(label.into());
    self
  }

  pub fn collection(mut self, collection: impl Into<String>) -> Self {
    self.spec.collection = Some(collection.into());
    self
  }

  /// Restrict the search to records that carry no tag at all.
  pub fn untagged(mut self) -> Self {
    self.spec.untagged = true;
    self.spec.tag = None;
    self
  }

  pub fn orderings(mut self, orderings: Vec<OrderBy>) -> Self {
    self.spec.orderings = orderings;
    self
  }

  pub fn offset(mut self, offset: u32) -> Self {
    self.spec.offset = offset;
    self
  }

  /// Page size; values below 1 are raised to 1.
  pub fn limit(mut self, limit: u32) -> Self {
    self.spec.limit = limit.max(1);
    self
  }

  pub fn spec(&self) -> &QuerySpec {
    &self.spec
  }

  /// Wrap the query in a lazily materialized result.
  pub fn execute(self) -> AssetQueryResult {
    AssetQueryResult::new(self)
  }

  /// Total number of matches. Asks for a single record and reads only
  /// the `found` field; a missing field counts as zero.
  pub async fn count(&self) -> Result<u64> {
    let response = self.client.search(&self.search_request(1, false)).await?;
    Ok(response.found.unwrap_or(0))
  }

  /// Run the search with the configured window and ordering and parse
  /// every result, in the order Canto returned them.
  pub async fn execute_and_fetch_all(&self) -> Result<Vec<AssetRecord>> {
    let request = self.search_request(self.spec.limit, true);
    let response = self.client.search(&request).await?;

    let records = response
      .results
      .unwrap_or_default()
      .iter()
      .map(AssetRecord::from_json)
      .collect::<Result<Vec<_>>>()?;

    debug!(
      term = %self.spec.search_term,
      filter = %self.spec.type_filter,
      offset = self.spec.offset,
      fetched = records.len(),
      "asset query executed"
    );
    Ok(records)
  }

  fn search_request(&self, limit: u32, with_orderings: bool) -> SearchRequest {
    SearchRequest {
      keyword: self.spec.search_term.clone(),
      format_types: self.spec.type_filter.format_types().to_vec(),
      file_types: self.spec.type_filter.file_types().to_vec(),
      tag: self.spec.tag.clone(),
      album: self.spec.collection.clone(),
      untagged: self.spec.untagged,
      start: self.spec.offset,
      limit,
      orderings: if with_orderings {
        self.spec.orderings.clone()
      } else {
        Vec::new()
      },
    }
  }
}

/// Ordered, in-memory view of materialized records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetList {
  records: Vec<AssetRecord>,
}

impl AssetList {
  pub fn len(&self) -> usize {
    self.records.len()
  }

  pub fn is_empty(&self) -> bool {
    self.records.is_empty()
  }

  pub fn first(&self) -> Option<&AssetRecord> {
    self.records.first()
  }

  pub fn get(&self, index: usize) -> Option<&AssetRecord> {
    self.records.get(index)
  }

  pub fn contains_index(&self, index: usize) -> bool {
    index < self.records.len()
  }

  /// Replace or append a record locally; Canto is never touched.
  /// Returns false when `index` is past the end.
  pub fn set(&mut self, index: usize, record: AssetRecord) -> bool {
    match index.cmp(&self.records.len()) {
      std::cmp::Ordering::Less => {
        self.records[index] = record;
        true
      }
      std::cmp::Ordering::Equal => {
        self.records.push(record);
        true
      }
      std::cmp::Ordering::Greater => false,
    }
  }

  pub fn iter(&self) -> std::slice::Iter<'_, AssetRecord> {
    self.records.iter()
  }

  pub fn as_slice(&self) -> &[AssetRecord] {
    &self.records
  }
}

impl From<Vec<AssetRecord>> for AssetList {
  fn from(records: Vec<AssetRecord>) -> Self {
    Self { records }
  }
}

impl<'a> IntoIterator for &'a AssetList {
  type Item = &'a AssetRecord;
  type IntoIter = std::slice::Iter<'a, AssetRecord>;

  fn into_iter(self) -> Self::IntoIter {
    self.records.iter()
  }
}

/// Lazy, restartable result of one [`AssetQuery`].
pub struct AssetQueryResult {
  query: AssetQuery,
  assets: Option<AssetList>,
  cursor: usize,
}

impl AssetQueryResult {
  pub fn new(query: AssetQuery) -> Self {
    Self {
      query,
      assets: None,
      cursor: 0,
    }
  }

  /// A copy of the underlying query, e.g. to run it again for fresh data.
  pub fn query(&self) -> AssetQuery {
    self.query.clone()
  }

  pub fn is_materialized(&self) -> bool {
    self.assets.is_some()
  }

  /// Fetch the records on first use and keep them.
  pub async fn assets(&mut self) -> Result<&mut AssetList> {
    match &mut self.assets {
      Some(assets) => Ok(assets),
      slot => {
        let records = self.query.execute_and_fetch_all().await?;
        self.cursor = 0;
        Ok(slot.insert(AssetList::from(records)))
      }
    }
  }

  /// Number of matches. Uses the records already fetched, otherwise
  /// asks Canto for the count only.
  pub async fn count(&self) -> Result<u64> {
    match &self.assets {
      Some(assets) => Ok(assets.len() as u64),
      None => self.query.count().await,
    }
  }

  pub async fn first(&mut self) -> Result<Option<&AssetRecord>> {
    Ok(self.assets().await?.first())
  }

  pub async fn to_vec(&mut self) -> Result<Vec<AssetRecord>> {
    Ok(self.assets().await?.as_slice().to_vec())
  }

  pub async fn get(&mut self, index: usize) -> Result<Option<&AssetRecord>> {
    Ok(self.assets().await?.get(index))
  }

  pub async fn contains_index(&mut self, index: usize) -> Result<bool> {
    Ok(self.assets().await?.contains_index(index))
  }

  pub async fn current(&mut self) -> Result<Option<&AssetRecord>> {
    let cursor = self.cursor;
    Ok(self.assets().await?.get(cursor))
  }

  /// Position of the cursor, or `None` once it ran past the end.
  pub async fn key(&mut self) -> Result<Option<usize>> {
    let cursor = self.cursor;
    let len = self.assets().await?.len();
    Ok((cursor < len).then_some(cursor))
  }

  pub async fn valid(&mut self) -> Result<bool> {
    Ok(self.key().await?.is_some())
  }

  pub async fn advance(&mut self) -> Result<()> {
    self.assets().await?;
    self.cursor += 1;
    Ok(())
  }

  /// Move the cursor back to the start without fetching again.
  pub async fn rewind(&mut self) -> Result<()> {
    self.assets().await?;
    self.cursor = 0;
    Ok(())
  }

  /// Current record, then advance. `None` at the end.
  pub async fn next_asset(&mut self) -> Result<Option<AssetRecord>> {
    let current = self.current().await?.cloned();
    if current.is_some() {
      self.cursor += 1;
    }
    Ok(current)
  }
}
