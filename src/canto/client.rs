use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::config::CantoConfig;
use crate::error::{Error, Result};

use super::api_types::{facet_value, ApiCustomField, ApiSearchResponse};
use super::types::{CustomField, OrderBy, SortDirection};

/// Query parameter Canto uses for "only records without any tag".
/// Passed through as-is; the search API owns its semantics.
const UNTAGGED_FILTER: (&str, &str) = ("untagged", "true");

/// Parameters of one search call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchRequest {
  pub keyword: String,
  pub format_types: Vec<&'static str>,
  pub file_types: Vec<&'static str>,
  pub tag: Option<String>,
  pub album: Option<String>,
  pub untagged: bool,
  pub start: u32,
  pub limit: u32,
  pub orderings: Vec<OrderBy>,
}

/// Fields written back to a Canto record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileUpdate {
  /// Comma-joined tag list; replaces the remote value
  pub keywords: String,
}

/// Authenticated access to the Canto API.
///
/// Implementations block the caller for one request/response exchange
/// and never retry.
#[async_trait]
pub trait CantoClient: Send + Sync {
  async fn search(&self, request: &SearchRequest) -> Result<ApiSearchResponse>;

  /// Raw record of one asset, same shape as one search result.
  async fn get_file(&self, identifier: &str) -> Result<Value>;

  async fn update_file(&self, identifier: &str, update: &FileUpdate) -> Result<()>;

  async fn get_custom_fields(&self) -> Result<Vec<CustomField>>;

  async fn get_facet_values(&self, field: &str) -> Result<Vec<String>>;
}

/// Canto REST client over reqwest with a bearer token.
#[derive(Clone)]
pub struct HttpCantoClient {
  http: reqwest::Client,
  api_base: Url,
  token: String,
}

impl HttpCantoClient {
  pub fn new(config: &CantoConfig, token: String) -> Result<Self> {
    let mut base = config.url.trim_end_matches('/').to_string();
    base.push_str("/api/v1/");
    let api_base = Url::parse(&base)
      .map_err(|e| Error::Connection(format!("Invalid Canto URL {}: {}", config.url, e)))?;

    let http = reqwest::Client::builder()
      .user_agent(concat!("canto-assets/", env!("CARGO_PKG_VERSION")))
      .build()?;

    Ok(Self {
      http,
      api_base,
      token,
    })
  }

  fn endpoint(&self, path: &str) -> Result<Url> {
    self
      .api_base
      .join(path)
      .map_err(|e| Error::Connection(format!("Invalid endpoint {}: {}", path, e)))
  }

  async fn send(&self, method: Method, url: Url, body: Option<&FileUpdate>) -> Result<reqwest::Response> {
    debug!(%method, %url, "canto request");

    let mut request = self
      .http
      .request(method.clone(), url.clone())
      .bearer_auth(&self.token);
    if let Some(body) = body {
      request = request.json(body);
    }

    let response = request.send().await?;
    let status = response.status();
    debug!(%method, %url, status = status.as_u16(), "canto response");

    match status {
      s if s.is_success() => Ok(response),
      StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
        warn!(%url, status = status.as_u16(), "canto rejected credentials");
        Err(Error::Authentication(format!(
          "Canto answered {} for {}",
          status, url
        )))
      }
      StatusCode::NOT_FOUND => Err(Error::AssetNotFound(url.path().to_string())),
      _ => Err(Error::Connection(format!(
        "Canto answered {} for {}",
        status, url
      ))),
    }
  }

  async fn get_json(&self, url: Url) -> Result<Value> {
    let response = self.send(Method::GET, url, None).await?;
    Ok(response.json::<Value>().await?)
  }
}

/// Split `image-42` into (`image`, `42`).
fn split_identifier(identifier: &str) -> Result<(&str, &str)> {
  identifier
    .split_once('-')
    .filter(|(scheme, id)| !scheme.is_empty() && !id.is_empty())
    .ok_or_else(|| Error::AssetNotFound(format!("malformed identifier '{}'", identifier)))
}

/// Canto sorts by one field; the first ordering wins.
fn sort_params(orderings: &[OrderBy]) -> Option<(&str, &'static str)> {
  let first = orderings.first()?;
  let field = match first.field.as_str() {
    "filename" | "label" | "name" => "name",
    "lastModified" | "last_modified" | "time" => "time",
    "fileSize" | "size" => "size",
    other => other,
  };
  let direction = match first.direction {
    SortDirection::Ascending => "ascending",
    SortDirection::Descending => "descending",
  };
  Some((field, direction))
}

#[async_trait]
impl CantoClient for HttpCantoClient {
  async fn search(&self, request: &SearchRequest) -> Result<ApiSearchResponse> {
    let mut url = self.endpoint("search")?;
    {
      let mut query = url.query_pairs_mut();
      query.append_pair("keyword", &request.keyword);
      if !request.format_types.is_empty() {
        query.append_pair("scheme", &request.format_types.join("|"));
      }
      if !request.file_types.is_empty() {
        query.append_pair("fileType", &request.file_types.join("|"));
      }
      if let Some(tag) = &request.tag {
        query.append_pair("tags", tag);
      }
      if let Some(album) = &request.album {
        query.append_pair("album", album);
      }
      if request.untagged {
        query.append_pair(UNTAGGED_FILTER.0, UNTAGGED_FILTER.1);
      }
      if let Some((sort_by, direction)) = sort_params(&request.orderings) {
        query.append_pair("sortBy", sort_by);
        query.append_pair("sortDirection", direction);
      }
      query.append_pair("start", &request.start.to_string());
      query.append_pair("limit", &request.limit.to_string());
    }

    let response = self.send(Method::GET, url, None).await?;
    Ok(response.json::<ApiSearchResponse>().await?)
  }

  async fn get_file(&self, identifier: &str) -> Result<Value> {
    let (scheme, id) = split_identifier(identifier)?;
    let url = self.endpoint(&format!("{}/{}", scheme, id))?;
    let body = self.send(Method::GET, url, None).await?.text().await?;
    serde_json::from_str(&body).map_err(|e| {
      debug!(identifier, error = %e, "undecodable asset payload");
      Error::AssetNotFound(identifier.to_string())
    })
  }

  async fn update_file(&self, identifier: &str, update: &FileUpdate) -> Result<()> {
    let (scheme, id) = split_identifier(identifier)?;
    let url = self.endpoint(&format!("{}/{}", scheme, id))?;
    self.send(Method::PUT, url, Some(update)).await?;
    Ok(())
  }

  async fn get_custom_fields(&self) -> Result<Vec<CustomField>> {
    let url = self.endpoint("custom/field")?;
    let fields: Vec<ApiCustomField> = serde_json::from_value(self.get_json(url).await?)
      .map_err(|e| Error::Connection(format!("Unexpected custom field payload: {}", e)))?;
    Ok(fields.into_iter().map(CustomField::from).collect())
  }

  async fn get_facet_values(&self, field: &str) -> Result<Vec<String>> {
    let url = self.endpoint(&format!("facet/{}", field))?;
    let body = self.get_json(url).await?;

    let values = match &body {
      Value::Array(items) => items.as_slice(),
      Value::Object(obj) => obj
        .get("values")
        .or_else(|| obj.get("results"))
        .and_then(|v| v.as_array())
        .map(Vec::as_slice)
        .unwrap_or_default(),
      _ => &[],
    };

    Ok(values.iter().filter_map(facet_value).collect())
  }
}
