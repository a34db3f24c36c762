//! In-memory Canto stand-in that records every call.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{Error, Result};

use super::api_types::ApiSearchResponse;
use super::client::{CantoClient, FileUpdate, SearchRequest};
use super::types::CustomField;

#[derive(Debug, Clone, Copy)]
pub enum FailMode {
  Authentication,
  Connection,
}

#[derive(Default)]
struct State {
  files: HashMap<String, Value>,
  found: Option<u64>,
  results: Vec<Value>,
  custom_fields: Vec<CustomField>,
  facets: HashMap<String, Vec<String>>,
  fail: Option<FailMode>,
  searches: Vec<SearchRequest>,
  get_file_calls: usize,
  updates: Vec<(String, FileUpdate)>,
}

#[derive(Default)]
pub struct FakeCantoClient {
  state: Mutex<State>,
}

impl FakeCantoClient {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_file(self, identifier: &str, raw: Value) -> Self {
    self.lock().files.insert(identifier.to_string(), raw);
    self
  }

  pub fn with_search(self, found: Option<u64>, results: Vec<Value>) -> Self {
    {
      let mut state = self.lock();
      state.found = found;
      state.results = results;
    }
    self
  }

  pub fn with_custom_fields(self, fields: Vec<CustomField>) -> Self {
    self.lock().custom_fields = fields;
    self
  }

  pub fn with_facet(self, field: &str, values: &[&str]) -> Self {
    self.lock().facets.insert(
      field.to_string(),
      values.iter().map(|v| v.to_string()).collect(),
    );
    self
  }

  pub fn fail(&self, mode: Option<FailMode>) {
    self.lock().fail = mode;
  }

  pub fn search_calls(&self) -> usize {
    self.lock().searches.len()
  }

  pub fn searches(&self) -> Vec<SearchRequest> {
    self.lock().searches.clone()
  }

  pub fn get_file_calls(&self) -> usize {
    self.lock().get_file_calls
  }

  pub fn updates(&self) -> Vec<(String, FileUpdate)> {
    self.lock().updates.clone()
  }

  fn lock(&self) -> std::sync::MutexGuard<'_, State> {
    self.state.lock().unwrap()
  }

  fn check_failure(state: &State) -> Result<()> {
    match state.fail {
      Some(FailMode::Authentication) => Err(Error::Authentication("token rejected".into())),
      Some(FailMode::Connection) => Err(Error::Connection("connection refused".into())),
      None => Ok(()),
    }
  }
}

#[async_trait]
impl CantoClient for FakeCantoClient {
  async fn search(&self, request: &SearchRequest) -> Result<ApiSearchResponse> {
    let mut state = self.lock();
    state.searches.push(request.clone());
    Self::check_failure(&state)?;

    let results = state
      .results
      .iter()
      .take(request.limit as usize)
      .cloned()
      .collect();
    Ok(ApiSearchResponse {
      found: state.found,
      results: Some(results),
    })
  }

  async fn get_file(&self, identifier: &str) -> Result<Value> {
    let mut state = self.lock();
    state.get_file_calls += 1;
    Self::check_failure(&state)?;

    state
      .files
      .get(identifier)
      .cloned()
      .ok_or_else(|| Error::AssetNotFound(identifier.to_string()))
  }

  async fn update_file(&self, identifier: &str, update: &FileUpdate) -> Result<()> {
    let mut state = self.lock();
    Self::check_failure(&state)?;
    state.updates.push((identifier.to_string(), update.clone()));

    if let Some(raw) = state.files.get_mut(identifier) {
      let tags: Vec<Value> = update
        .keywords
        .split(',')
        .filter(|t| !t.is_empty())
        .map(|t| Value::String(t.to_string()))
        .collect();
      raw["tag"] = Value::Array(tags);
    }
    Ok(())
  }

  async fn get_custom_fields(&self) -> Result<Vec<CustomField>> {
    let state = self.lock();
    Self::check_failure(&state)?;
    Ok(state.custom_fields.clone())
  }

  async fn get_facet_values(&self, field: &str) -> Result<Vec<String>> {
    let state = self.lock();
    Self::check_failure(&state)?;
    Ok(state.facets.get(field).cloned().unwrap_or_default())
  }
}
