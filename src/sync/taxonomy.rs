//! Imports Canto taxonomy (custom fields, tag facets) as local
//! collections and tags. Additive only: nothing local is ever removed.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::canto::client::CantoClient;
use crate::config::{CustomFieldMapping, TagMapping, ValueFilter};
use crate::error::Result;
use crate::store::{LocalCollection, TagStore};

/// One reconciliation step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaxonomyEvent {
  CollectionCreated { title: String },
  CollectionExists { title: String },
  /// New local tag (attached to `collection` when importing a custom field)
  TagCreated { label: String, collection: Option<String> },
  /// Existing tag newly attached to a collection
  TagAttached { label: String, collection: String },
  /// Tag already present (and attached, where applicable)
  TagUnchanged { label: String },
  /// The value could not be written locally
  Failed { value: String, error: String },
}

impl TaxonomyEvent {
  pub fn is_change(&self) -> bool {
    matches!(
      self,
      TaxonomyEvent::CollectionCreated { .. }
        | TaxonomyEvent::TagCreated { .. }
        | TaxonomyEvent::TagAttached { .. }
    )
  }
}

/// Counts of one import run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
  /// Creations and attachments
  pub changes: usize,
  /// Things that already existed
  pub unchanged: usize,
  pub failed: usize,
}

impl ImportSummary {
  fn record(&mut self, event: &TaxonomyEvent) {
    match event {
      TaxonomyEvent::Failed { .. } => self.failed += 1,
      e if e.is_change() => self.changes += 1,
      _ => self.unchanged += 1,
    }
  }
}

pub struct TaxonomyImporter<'a> {
  client: Arc<dyn CantoClient>,
  store: &'a dyn TagStore,
}

impl<'a> TaxonomyImporter<'a> {
  pub fn new(client: Arc<dyn CantoClient>, store: &'a dyn TagStore) -> Self {
    Self { client, store }
  }

  /// Turn mapped custom fields into collections and, where configured,
  /// their values into tags attached to that collection.
  ///
  /// Fetching the field definitions is the only step that aborts the
  /// run; local write failures are reported per value.
  pub async fn import_custom_fields(
    &self,
    mapping: &BTreeMap<String, CustomFieldMapping>,
    mut on_event: impl FnMut(&TaxonomyEvent),
  ) -> Result<ImportSummary> {
    let fields = self.client.get_custom_fields().await?;
    info!(fields = fields.len(), "importing custom fields");

    let mut summary = ImportSummary::default();
    let mut emit = |event: TaxonomyEvent| {
      summary.record(&event);
      on_event(&event);
    };

    for field in fields {
      let Some(field_mapping) = mapping.get(&field.id) else {
        debug!(id = %field.id, name = %field.name, "custom field not mapped");
        continue;
      };
      if !field_mapping.as_asset_collection {
        continue;
      }

      let collection = match self.find_or_create_collection(&field.name) {
        Ok((collection, event)) => {
          emit(event);
          collection
        }
        Err(e) => {
          warn!(collection = %field.name, error = %e, "collection import failed");
          emit(TaxonomyEvent::Failed {
            value: field.name.clone(),
            error: e.to_string(),
          });
          continue;
        }
      };

      if !field_mapping.values_as_tags {
        continue;
      }

      for value in allowed_values(&field.values, &field_mapping.filter) {
        let event = self
          .import_collection_tag(&collection, value)
          .unwrap_or_else(|e| {
            warn!(tag = %value, error = %e, "tag import failed");
            TaxonomyEvent::Failed {
              value: value.to_string(),
              error: e.to_string(),
            }
          });
        emit(event);
      }
    }

    Ok(summary)
  }

  /// Turn the first page of a facet's values into tags.
  pub async fn import_tags(
    &self,
    mapping: &TagMapping,
    mut on_event: impl FnMut(&TaxonomyEvent),
  ) -> Result<ImportSummary> {
    let values = self.client.get_facet_values(&mapping.field).await?;
    info!(field = %mapping.field, values = values.len(), limit = mapping.limit, "importing tags");

    let first_page: Vec<String> = values.into_iter().take(mapping.limit).collect();

    let mut summary = ImportSummary::default();
    for label in allowed_values(&first_page, &mapping.filter) {
      let event = match self.store.find_tag_by_label(label) {
        Ok(Some(_)) => TaxonomyEvent::TagUnchanged {
          label: label.to_string(),
        },
        Ok(None) => match self.store.add_tag(label) {
          Ok(_) => TaxonomyEvent::TagCreated {
            label: label.to_string(),
            collection: None,
          },
          Err(e) => TaxonomyEvent::Failed {
            value: label.to_string(),
            error: e.to_string(),
          },
        },
        Err(e) => TaxonomyEvent::Failed {
          value: label.to_string(),
          error: e.to_string(),
        },
      };
      summary.record(&event);
      on_event(&event);
    }

    Ok(summary)
  }

  fn find_or_create_collection(&self, title: &str) -> Result<(LocalCollection, TaxonomyEvent)> {
    if let Some(existing) = self.store.find_collection_by_title(title)? {
      return Ok((
        existing,
        TaxonomyEvent::CollectionExists {
          title: title.to_string(),
        },
      ));
    }
    let created = self.store.add_collection(title)?;
    Ok((
      created,
      TaxonomyEvent::CollectionCreated {
        title: title.to_string(),
      },
    ))
  }

  fn import_collection_tag(&self, collection: &LocalCollection, label: &str) -> Result<TaxonomyEvent> {
    match self.store.find_tag_by_label(label)? {
      None => {
        let tag = self.store.add_tag(label)?;
        self.store.attach_tag(collection, &tag)?;
        Ok(TaxonomyEvent::TagCreated {
          label: label.to_string(),
          collection: Some(collection.title.clone()),
        })
      }
      Some(tag) if !self.store.collection_has_tag(collection, &tag)? => {
        self.store.attach_tag(collection, &tag)?;
        Ok(TaxonomyEvent::TagAttached {
          label: label.to_string(),
          collection: collection.title.clone(),
        })
      }
      Some(_) => Ok(TaxonomyEvent::TagUnchanged {
        label: label.to_string(),
      }),
    }
  }
}

fn allowed_values<'v>(values: &'v [String], filter: &'v ValueFilter) -> impl Iterator<Item = &'v str> {
  values
    .iter()
    .map(String::as_str)
    .filter(move |v| filter.allows(v))
}
