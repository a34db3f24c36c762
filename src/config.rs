use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub canto: CantoConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub store: StoreConfig,
  #[serde(default)]
  pub auto_tagging: AutoTaggingConfig,
  #[serde(default)]
  pub mapping: MappingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CantoConfig {
  /// Base URL of the Canto site, e.g. https://example.canto.com
  pub url: String,
  /// Identifier local assets carry when they were imported from Canto
  #[serde(default = "default_asset_source")]
  pub asset_source: String,
}

fn default_asset_source() -> String {
  "canto".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Seconds after which a cached entry counts as a miss
  #[serde(default = "default_cache_lifetime")]
  pub lifetime_secs: u64,
  pub path: Option<PathBuf>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      lifetime_secs: default_cache_lifetime(),
      path: None,
    }
  }
}

fn default_true() -> bool {
  true
}

fn default_cache_lifetime() -> u64 {
  86_400
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreConfig {
  pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AutoTaggingConfig {
  #[serde(default)]
  pub enabled: bool,
  #[serde(default = "default_in_use_tag")]
  pub in_use_tag: String,
}

impl Default for AutoTaggingConfig {
  fn default() -> Self {
    Self {
      enabled: false,
      in_use_tag: default_in_use_tag(),
    }
  }
}

fn default_in_use_tag() -> String {
  "used".to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MappingConfig {
  /// Keyed by Canto custom field id
  #[serde(default)]
  pub custom_fields: BTreeMap<String, CustomFieldMapping>,
  pub tags: Option<TagMapping>,
}

/// Include/exclude lists applied to remote values before they become tags.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct ValueFilter {
  #[serde(default)]
  pub include: Vec<String>,
  #[serde(default)]
  pub exclude: Vec<String>,
}

impl ValueFilter {
  /// A non-empty include list restricts to its values; a non-empty
  /// exclude list removes its values. Matching is exact.
  pub fn allows(&self, value: &str) -> bool {
    if !self.include.is_empty() && !self.include.iter().any(|v| v == value) {
      return false;
    }
    if !self.exclude.is_empty() && self.exclude.iter().any(|v| v == value) {
      return false;
    }
    true
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomFieldMapping {
  #[serde(default)]
  pub as_asset_collection: bool,
  #[serde(default)]
  pub values_as_tags: bool,
  #[serde(flatten)]
  pub filter: ValueFilter,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TagMapping {
  /// Facet name whose values become tags
  pub field: String,
  /// Only the first `limit` facet values are considered
  #[serde(default = "default_tag_limit")]
  pub limit: usize,
  #[serde(flatten)]
  pub filter: ValueFilter,
}

fn default_tag_limit() -> usize {
  200
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./canto-assets.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/canto-assets/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/canto-assets/config.yaml"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("canto-assets.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("canto-assets").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> std::result::Result<Self, serde_yaml::Error> {
    serde_yaml::from_str(contents)
  }

  /// Get the Canto access token from environment variables.
  ///
  /// Checks CANTO_ACCESS_TOKEN first, then CANTO_API_TOKEN as fallback.
  pub fn get_access_token() -> Result<String> {
    std::env::var("CANTO_ACCESS_TOKEN")
      .or_else(|_| std::env::var("CANTO_API_TOKEN"))
      .map_err(|_| {
        eyre!("Canto access token not found. Set CANTO_ACCESS_TOKEN or CANTO_API_TOKEN.")
      })
  }

  pub fn cache_path(&self) -> Result<PathBuf> {
    match &self.cache.path {
      Some(p) => Ok(p.clone()),
      None => Ok(data_dir()?.join("cache.db")),
    }
  }

  pub fn store_path(&self) -> Result<PathBuf> {
    match &self.store.path {
      Some(p) => Ok(p.clone()),
      None => Ok(data_dir()?.join("store.db")),
    }
  }
}

fn data_dir() -> Result<PathBuf> {
  let data_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?;

  Ok(data_dir.join("canto-assets"))
}

#[cfg(test)]
mod tests {
  use super::*;

  const SAMPLE: &str = r#"
canto:
  url: https://example.canto.com
auto_tagging:
  enabled: true
mapping:
  custom_fields:
    CF_1:
      as_asset_collection: true
      values_as_tags: true
      include: [Spring, Summer]
  tags:
    field: keyword
    limit: 50
    exclude: [internal]
"#;

  #[test]
  fn test_parse_full_config() {
    let config = Config::from_yaml(SAMPLE).unwrap();
    assert_eq!(config.canto.asset_source, "canto");
    assert!(config.cache.enabled);
    assert_eq!(config.cache.lifetime_secs, 86_400);
    assert!(config.auto_tagging.enabled);
    assert_eq!(config.auto_tagging.in_use_tag, "used");

    let cf = &config.mapping.custom_fields["CF_1"];
    assert!(cf.as_asset_collection);
    assert!(cf.values_as_tags);
    assert_eq!(cf.filter.include, vec!["Spring", "Summer"]);
    assert!(cf.filter.exclude.is_empty());

    let tags = config.mapping.tags.unwrap();
    assert_eq!(tags.field, "keyword");
    assert_eq!(tags.limit, 50);
    assert_eq!(tags.filter.exclude, vec!["internal"]);
  }

  #[test]
  fn test_minimal_config_defaults() {
    let config = Config::from_yaml("canto:\n  url: https://x.canto.com\n").unwrap();
    assert!(!config.auto_tagging.enabled);
    assert!(config.mapping.custom_fields.is_empty());
    assert!(config.mapping.tags.is_none());
  }

  #[test]
  fn test_value_filter_include_and_exclude_combine() {
    let filter = ValueFilter {
      include: vec!["x".into(), "y".into()],
      exclude: vec!["y".into()],
    };
    let allowed: Vec<&str> = ["x", "y", "z"]
      .into_iter()
      .filter(|v| filter.allows(v))
      .collect();
    assert_eq!(allowed, vec!["x"]);
  }

  #[test]
  fn test_empty_value_filter_allows_everything() {
    let filter = ValueFilter::default();
    assert!(filter.allows("anything"));
  }
}
