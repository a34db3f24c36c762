//! Cache keys for Canto lookups.

use sha2::{Digest, Sha256};

/// Cache namespace of raw per-asset payloads
pub const ASSET_NAMESPACE: &str = "asset_proxy";
/// Cache namespace of derived aggregate facts
pub const COUNT_NAMESPACE: &str = "asset_counts";

/// Cache tag of per-asset entries
pub const ASSET_TAG: &str = "asset";
/// Cache tag of per-tag count entries
pub const TAG_COUNT_TAG: &str = "tag_count";

/// Keys of cached Canto facts.
#[derive(Clone, Debug)]
pub enum CantoCacheKey {
  /// Raw record of a single asset
  Asset { identifier: String },
  /// Number of assets carrying a tag
  TagCount { label: String },
}

impl CantoCacheKey {
  pub fn cache_key(&self) -> String {
    match self {
      // Identifiers are `<scheme>-<id>` and safe to use verbatim
      Self::Asset { identifier } => identifier.clone(),
      Self::TagCount { label } => format!("{}_{}", TAG_COUNT_TAG, sha256_hex(label)),
    }
  }

  pub fn tag(&self) -> &'static str {
    match self {
      Self::Asset { .. } => ASSET_TAG,
      Self::TagCount { .. } => TAG_COUNT_TAG,
    }
  }
}

/// SHA256 hash for stable, fixed-length keys
fn sha256_hex(input: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(input.as_bytes());
  hex::encode(hasher.finalize())
}
