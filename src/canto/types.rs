use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Name of the IPTC property carrying the copyright notice
pub const COPYRIGHT_NOTICE: &str = "CopyrightNotice";

/// One Canto asset, normalized from a raw API record.
///
/// Built once per payload and never mutated; a changed remote record
/// yields a new value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRecord {
  /// `<scheme>-<id>`, e.g. `image-42`
  pub identifier: String,
  pub label: String,
  pub filename: String,
  pub last_modified: DateTime<Utc>,
  pub file_size: u64,
  pub media_type: String,
  pub width: Option<u32>,
  pub height: Option<u32>,
  pub tags: Vec<String>,
  pub iptc_properties: BTreeMap<String, String>,
  pub preview_uri: String,
  pub original_uri: String,
}

impl AssetRecord {
  pub fn has_iptc_property(&self, name: &str) -> bool {
    self.iptc_properties.contains_key(name)
  }

  pub fn iptc_property(&self, name: &str) -> &str {
    self.iptc_properties.get(name).map(String::as_str).unwrap_or("")
  }

  /// Preview URI rendered for a bounding box of `max_edge` pixels.
  pub fn preview_uri_for(&self, max_edge: u32) -> String {
    sized_uri(&self.preview_uri, max_edge)
  }
}

/// Canto preview URLs end in `/<size>`; swap that segment for our own.
fn sized_uri(uri: &str, max_edge: u32) -> String {
  let base = match uri.rsplit_once('/') {
    Some((head, tail)) if !tail.is_empty() && tail.bytes().all(|b| b.is_ascii_digit()) => head,
    _ => uri,
  };
  format!("{}/{}", base, max_edge)
}

/// Asset type filter of a query; each variant maps to fixed Canto scheme
/// codes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssetTypeFilter {
  #[default]
  All,
  Image,
  Video,
  Audio,
  Document,
}

impl AssetTypeFilter {
  /// Remote format types (Canto "scheme") to search in. Never empty.
  pub fn format_types(self) -> &'static [&'static str] {
    match self {
      AssetTypeFilter::All => &["image", "video", "audio", "document"],
      AssetTypeFilter::Image => &["image"],
      AssetTypeFilter::Video => &["video"],
      AssetTypeFilter::Audio => &["audio"],
      AssetTypeFilter::Document => &["document"],
    }
  }

  /// Additional file type restriction; empty means unrestricted.
  pub fn file_types(self) -> &'static [&'static str] {
    match self {
      AssetTypeFilter::Document => &["pdf"],
      _ => &[],
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      AssetTypeFilter::All => "All",
      AssetTypeFilter::Image => "Image",
      AssetTypeFilter::Video => "Video",
      AssetTypeFilter::Audio => "Audio",
      AssetTypeFilter::Document => "Document",
    }
  }
}

/// Case-sensitive; anything unrecognized falls back to `All`.
impl From<&str> for AssetTypeFilter {
  fn from(value: &str) -> Self {
    match value {
      "Image" => AssetTypeFilter::Image,
      "Video" => AssetTypeFilter::Video,
      "Audio" => AssetTypeFilter::Audio,
      "Document" => AssetTypeFilter::Document,
      _ => AssetTypeFilter::All,
    }
  }
}

impl fmt::Display for AssetTypeFilter {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
  Ascending,
  Descending,
}

/// One `field → direction` pair of a query's ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
  pub field: String,
  pub direction: SortDirection,
}

impl OrderBy {
  pub fn asc(field: impl Into<String>) -> Self {
    Self {
      field: field.into(),
      direction: SortDirection::Ascending,
    }
  }

  pub fn desc(field: impl Into<String>) -> Self {
    Self {
      field: field.into(),
      direction: SortDirection::Descending,
    }
  }

  /// Parse `field`, `field:asc` or `field:desc`.
  pub fn parse(input: &str) -> Option<Self> {
    let (field, direction) = match input.split_once(':') {
      Some((field, dir)) => (field, dir),
      None => (input, "asc"),
    };
    if field.is_empty() {
      return None;
    }
    match direction.to_ascii_lowercase().as_str() {
      "asc" | "ascending" => Some(Self::asc(field)),
      "desc" | "descending" => Some(Self::desc(field)),
      _ => None,
    }
  }
}

/// Number of records a query returns when no limit is set
pub const DEFAULT_LIMIT: u32 = 30;

/// Everything a search needs. Owned by the query that executes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySpec {
  /// Empty matches everything
  pub search_term: String,
  pub type_filter: AssetTypeFilter,
  pub tag: Option<String>,
  pub collection: Option<String>,
  /// Only records without any tag
  pub untagged: bool,
  pub orderings: Vec<OrderBy>,
  pub offset: u32,
  /// Always > 0
  pub limit: u32,
}

impl Default for QuerySpec {
  fn default() -> Self {
    Self {
      search_term: String::new(),
      type_filter: AssetTypeFilter::All,
      tag: None,
      collection: None,
      untagged: false,
      orderings: Vec::new(),
      offset: 0,
      limit: DEFAULT_LIMIT,
    }
  }
}

/// Canto custom field definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomField {
  pub id: String,
  pub name: String,
  pub values: Vec<String>,
}

/// Result of a cached per-tag count.
///
/// `Unknown` means the count could not be obtained from Canto; it is
/// never conflated with a real zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagCount {
  Known(u64),
  Unknown,
}

impl TagCount {
  /// Degraded view for callers that only want a number.
  pub fn value_or_zero(self) -> u64 {
    match self {
      TagCount::Known(n) => n,
      TagCount::Unknown => 0,
    }
  }
}

impl fmt::Display for TagCount {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      TagCount::Known(n) => write!(f, "{}", n),
      TagCount::Unknown => f.write_str("unknown"),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_type_filter_mapping_is_total() {
    let filters = [
      AssetTypeFilter::All,
      AssetTypeFilter::Image,
      AssetTypeFilter::Video,
      AssetTypeFilter::Audio,
      AssetTypeFilter::Document,
    ];
    for (i, a) in filters.iter().enumerate() {
      assert!(!a.format_types().is_empty());
      for b in &filters[i + 1..] {
        assert_ne!(a.format_types(), b.format_types());
      }
    }
    assert_eq!(AssetTypeFilter::Document.file_types(), &["pdf"]);
    assert!(AssetTypeFilter::Image.file_types().is_empty());
    assert_eq!(
      AssetTypeFilter::All.format_types(),
      &["image", "video", "audio", "document"]
    );
  }

  #[test]
  fn test_unrecognized_filter_is_all() {
    assert_eq!(AssetTypeFilter::from("Spreadsheet"), AssetTypeFilter::All);
    assert_eq!(AssetTypeFilter::from("image"), AssetTypeFilter::All);
    assert_eq!(AssetTypeFilter::from("Video"), AssetTypeFilter::Video);
  }

  #[test]
  fn test_order_by_parse() {
    assert_eq!(OrderBy::parse("filename"), Some(OrderBy::asc("filename")));
    assert_eq!(
      OrderBy::parse("lastModified:DESC"),
      Some(OrderBy::desc("lastModified"))
    );
    assert_eq!(OrderBy::parse("name:sideways"), None);
    assert_eq!(OrderBy::parse(":asc"), None);
  }

  #[test]
  fn test_sized_uri_replaces_trailing_size() {
    assert_eq!(
      sized_uri("https://x.canto.com/preview/image/42/800", 250),
      "https://x.canto.com/preview/image/42/250"
    );
    assert_eq!(
      sized_uri("https://x.canto.com/preview/image/abc", 250),
      "https://x.canto.com/preview/image/abc/250"
    );
  }

  #[test]
  fn test_tag_count_display() {
    assert_eq!(TagCount::Known(3).to_string(), "3");
    assert_eq!(TagCount::Unknown.to_string(), "unknown");
    assert_eq!(TagCount::Unknown.value_or_zero(), 0);
  }
}
