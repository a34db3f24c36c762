//! Serde-deserializable types matching Canto API responses.
//!
//! These types are separate from domain types to allow clean deserialization
//! while keeping domain types focused on application needs.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::{Error, Result};

use super::types::{AssetRecord, CustomField, COPYRIGHT_NOTICE};

/// `Date modified` is stored as `YYYYMMDDhhmmss` plus milliseconds.
const DATE_MODIFIED_FORMAT: &str = "%Y%m%d%H%M%S%3f";

// ============================================================================
// Search endpoint response
// ============================================================================

#[derive(Debug, Deserialize, Default)]
pub struct ApiSearchResponse {
  /// Total number of matches, independent of the page size
  pub found: Option<u64>,
  /// Raw records; parsed one by one so a bad record names itself
  #[serde(default)]
  pub results: Option<Vec<Value>>,
}

// ============================================================================
// Asset record
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiDefaultMetadata {
  #[serde(rename = "Date modified")]
  pub date_modified: String,
  #[serde(rename = "Copyright")]
  pub copyright: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApiAssetUrls {
  #[serde(rename = "directUrlOriginal")]
  pub direct_url_original: String,
  #[serde(rename = "directUrlPreview")]
  pub direct_url_preview: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiAsset {
  pub scheme: String,
  pub id: Value,
  pub name: String,
  pub size: Option<Value>,
  pub width: Option<Value>,
  pub height: Option<Value>,
  pub tag: Option<Vec<String>>,
  pub default: ApiDefaultMetadata,
  pub copyright: Option<String>,
  pub url: ApiAssetUrls,
}

impl ApiAsset {
  pub fn identifier(&self) -> String {
    format!("{}-{}", self.scheme, scalar_to_string(&self.id))
  }

  pub fn into_record(self) -> Result<AssetRecord> {
    let identifier = self.identifier();

    let last_modified = parse_date_modified(&self.default.date_modified).ok_or_else(|| {
      Error::parse(
        &identifier,
        format!("unreadable Date modified '{}'", self.default.date_modified),
      )
    })?;

    let file_size = match &self.size {
      Some(v) => parse_u64(v)
        .ok_or_else(|| Error::parse(&identifier, format!("unreadable size {}", v)))?,
      None => 0,
    };

    let copyright = self
      .copyright
      .or(self.default.copyright)
      .unwrap_or_default();
    let mut iptc_properties = BTreeMap::new();
    iptc_properties.insert(COPYRIGHT_NOTICE.to_string(), copyright);

    Ok(AssetRecord {
      media_type: media_type_from_filename(&self.name).to_string(),
      label: self.name.clone(),
      filename: self.name,
      identifier,
      last_modified,
      file_size,
      width: self.width.as_ref().and_then(parse_dimension),
      height: self.height.as_ref().and_then(parse_dimension),
      tags: self.tag.unwrap_or_default(),
      iptc_properties,
      preview_uri: self.url.direct_url_preview,
      original_uri: self.url.direct_url_original,
    })
  }
}

impl AssetRecord {
  /// Build a record from one raw Canto record.
  pub fn from_json(raw: &Value) -> Result<AssetRecord> {
    let api: ApiAsset = serde_json::from_value(raw.clone())
      .map_err(|e| Error::parse(raw_identifier(raw), e.to_string()))?;
    api.into_record()
  }
}

// ============================================================================
// Custom fields endpoint response
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiCustomField {
  pub id: Value,
  pub name: String,
  #[serde(default)]
  pub values: Option<Vec<String>>,
}

impl From<ApiCustomField> for CustomField {
  fn from(field: ApiCustomField) -> Self {
    CustomField {
      id: scalar_to_string(&field.id),
      name: field.name,
      values: field.values.unwrap_or_default(),
    }
  }
}

// ============================================================================
// Facet values
// ============================================================================

/// A facet value is either a bare string or an object with a `value`
/// (or `name`) plus a hit count.
pub fn facet_value(value: &Value) -> Option<String> {
  if let Some(s) = value.as_str() {
    return Some(s.to_string());
  }
  let obj = value.as_object()?;
  obj
    .get("value")
    .or_else(|| obj.get("name"))
    .and_then(|v| v.as_str())
    .map(String::from)
}

// ============================================================================
// Helpers
// ============================================================================

/// Best-effort identifier of a raw record for error reports.
pub fn raw_identifier(raw: &Value) -> String {
  match (raw.get("scheme"), raw.get("id")) {
    (Some(scheme), Some(id)) => format!("{}-{}", scalar_to_string(scheme), scalar_to_string(id)),
    (None, Some(id)) => scalar_to_string(id),
    _ => "<unknown>".to_string(),
  }
}

fn scalar_to_string(value: &Value) -> String {
  match value {
    Value::String(s) => s.clone(),
    other => other.to_string(),
  }
}

fn parse_date_modified(value: &str) -> Option<DateTime<Utc>> {
  NaiveDateTime::parse_from_str(value, DATE_MODIFIED_FORMAT)
    .ok()
    .map(|dt| dt.and_utc())
}

/// Numbers arrive as JSON numbers or numeric strings.
fn parse_u64(value: &Value) -> Option<u64> {
  match value {
    Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f as u64)),
    Value::String(s) if s.trim().is_empty() => Some(0),
    Value::String(s) => s.trim().parse().ok(),
    Value::Null => Some(0),
    _ => None,
  }
}

/// Zero, missing or unreadable dimensions mean "not a visual asset".
fn parse_dimension(value: &Value) -> Option<u32> {
  parse_u64(value)
    .filter(|n| *n > 0)
    .and_then(|n| u32::try_from(n).ok())
}

/// Media type by filename extension.
pub fn media_type_from_filename(filename: &str) -> &'static str {
  let extension = match filename.rsplit_once('.') {
    Some((_, ext)) => ext.to_ascii_lowercase(),
    None => return "application/octet-stream",
  };

  match extension.as_str() {
    "jpg" | "jpeg" | "jpe" => "image/jpeg",
    "png" => "image/png",
    "gif" => "image/gif",
    "webp" => "image/webp",
    "tif" | "tiff" => "image/tiff",
    "bmp" => "image/bmp",
    "svg" => "image/svg+xml",
    "heic" => "image/heic",
    "psd" => "image/vnd.adobe.photoshop",
    "eps" => "application/postscript",
    "mp4" | "m4v" => "video/mp4",
    "mov" => "video/quicktime",
    "webm" => "video/webm",
    "avi" => "video/x-msvideo",
    "mpg" | "mpeg" => "video/mpeg",
    "mp3" => "audio/mpeg",
    "wav" => "audio/wav",
    "ogg" => "audio/ogg",
    "flac" => "audio/flac",
    "m4a" => "audio/mp4",
    "aac" => "audio/aac",
    "pdf" => "application/pdf",
    "doc" => "application/msword",
    "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "xls" => "application/vnd.ms-excel",
    "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "ppt" => "application/vnd.ms-powerpoint",
    "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    "zip" => "application/zip",
    "txt" => "text/plain",
    _ => "application/octet-stream",
  }
}

#[cfg(test)]
pub(crate) mod tests {
  use super::*;
  use serde_json::json;

  pub(crate) fn sample_asset(scheme: &str, id: &str, name: &str, tags: &[&str]) -> Value {
    json!({
      "scheme": scheme,
      "id": id,
      "name": name,
      "size": "204800",
      "width": "1920",
      "height": "1080",
      "tag": tags,
      "default": {
        "Date modified": "20240312093015123",
        "Copyright": "Default Corp"
      },
      "url": {
        "directUrlOriginal": format!("https://x.canto.com/direct/{}/{}/original", scheme, id),
        "directUrlPreview": format!("https://x.canto.com/direct/{}/{}/preview/800", scheme, id)
      }
    })
  }

  #[test]
  fn test_parse_sample_record() {
    let raw = sample_asset("image", "42", "photo.jpg", &["a", "b"]);
    let record = AssetRecord::from_json(&raw).unwrap();

    assert_eq!(record.identifier, "image-42");
    assert_eq!(record.label, "photo.jpg");
    assert_eq!(record.filename, "photo.jpg");
    assert_eq!(record.media_type, "image/jpeg");
    assert_eq!(record.file_size, 204_800);
    assert_eq!(record.width, Some(1920));
    assert_eq!(record.height, Some(1080));
    assert_eq!(record.tags, vec!["a", "b"]);
    assert_eq!(record.iptc_property(COPYRIGHT_NOTICE), "Default Corp");
    assert_eq!(
      record.last_modified.format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
      "2024-03-12 09:30:15.123"
    );
    assert_eq!(
      record.preview_uri_for(400),
      "https://x.canto.com/direct/image/42/preview/400"
    );
  }

  #[test]
  fn test_zero_or_missing_dimensions_are_none() {
    let mut raw = sample_asset("document", "7", "brochure.pdf", &[]);
    raw["width"] = json!(0);
    raw.as_object_mut().unwrap().remove("height");

    let record = AssetRecord::from_json(&raw).unwrap();
    assert_eq!(record.media_type, "application/pdf");
    assert_eq!(record.width, None);
    assert_eq!(record.height, None);
  }

  #[test]
  fn test_top_level_copyright_wins() {
    let mut raw = sample_asset("image", "1", "a.png", &[]);
    raw["copyright"] = json!("Top Corp");
    let record = AssetRecord::from_json(&raw).unwrap();
    assert_eq!(record.iptc_property(COPYRIGHT_NOTICE), "Top Corp");
  }

  #[test]
  fn test_copyright_notice_always_present() {
    let mut raw = sample_asset("image", "1", "a.png", &[]);
    raw["default"] = json!({ "Date modified": "20240312093015123" });
    let record = AssetRecord::from_json(&raw).unwrap();
    assert!(record.has_iptc_property(COPYRIGHT_NOTICE));
    assert_eq!(record.iptc_property(COPYRIGHT_NOTICE), "");
  }

  #[test]
  fn test_numeric_size_and_null_tags() {
    let mut raw = sample_asset("video", "9", "clip.mov", &[]);
    raw["size"] = json!(1024);
    raw["tag"] = Value::Null;
    let record = AssetRecord::from_json(&raw).unwrap();
    assert_eq!(record.file_size, 1024);
    assert!(record.tags.is_empty());
    assert_eq!(record.media_type, "video/quicktime");
  }

  #[test]
  fn test_missing_required_field_names_identifier() {
    let mut raw = sample_asset("image", "42", "photo.jpg", &[]);
    raw.as_object_mut().unwrap().remove("url");
    match AssetRecord::from_json(&raw) {
      Err(Error::Parse { identifier, .. }) => assert_eq!(identifier, "image-42"),
      other => panic!("expected parse error, got {:?}", other),
    }
  }

  #[test]
  fn test_bad_timestamp_is_parse_error() {
    let mut raw = sample_asset("image", "42", "photo.jpg", &[]);
    raw["default"]["Date modified"] = json!("yesterday");
    assert!(matches!(
      AssetRecord::from_json(&raw),
      Err(Error::Parse { .. })
    ));
  }

  #[test]
  fn test_media_type_unknown_extension() {
    assert_eq!(media_type_from_filename("README"), "application/octet-stream");
    assert_eq!(media_type_from_filename("song.MP3"), "audio/mpeg");
  }

  #[test]
  fn test_facet_value_shapes() {
    assert_eq!(facet_value(&json!("red")), Some("red".to_string()));
    assert_eq!(
      facet_value(&json!({"value": "blue", "count": 3})),
      Some("blue".to_string())
    );
    assert_eq!(facet_value(&json!(12)), None);
  }

  #[test]
  fn test_custom_field_conversion() {
    let api: ApiCustomField =
      serde_json::from_value(json!({"id": 5, "name": "Season", "values": ["Spring"]})).unwrap();
    let field = CustomField::from(api);
    assert_eq!(field.id, "5");
    assert_eq!(field.values, vec!["Spring"]);
  }
}
