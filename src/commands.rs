//! Command runners behind the CLI subcommands.
//!
//! Each runner writes its report lines to `out` and returns the process
//! exit code. Unmet preconditions (feature disabled, nothing mapped) print
//! a message and exit 1; per-item failures inside a batch do not.

use color_eyre::Result;
use std::io::Write;
use std::process::ExitCode;

use crate::canto::repository::AssetRepository;
use crate::canto::types::{AssetRecord, AssetTypeFilter, OrderBy, QuerySpec};
use crate::config::{AutoTaggingConfig, MappingConfig};
use crate::store::{LocalAsset, SqliteStore, TagStore, UsageSource};
use crate::sync::tagging::{TagOutcome, TagSyncItem, TaggingSynchronizer};
use crate::sync::taxonomy::{TaxonomyEvent, TaxonomyImporter};
use crate::sync::BatchSummary;

/// Filters and window of the `search` subcommand.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct SearchArgs {
  /// Full-text search term
  #[arg(long)]
  pub term: Option<String>,

  /// Only assets carrying this tag
  #[arg(long, conflicts_with = "untagged")]
  pub tag: Option<String>,

  /// Only assets without any tag
  #[arg(long)]
  pub untagged: bool,

  /// Only assets in this album
  #[arg(long)]
  pub collection: Option<String>,

  /// Image, Video, Audio, Document or All
  #[arg(long = "type", default_value = "All")]
  pub type_filter: String,

  /// Ordering as field:asc or field:desc; the first one is used
  #[arg(long = "sort", value_parser = parse_order_by)]
  pub sort: Vec<OrderBy>,

  #[arg(long, default_value_t = 0)]
  pub offset: u32,

  #[arg(long)]
  pub limit: Option<u32>,

  /// Print the number of matches only
  #[arg(long)]
  pub count: bool,
}

fn parse_order_by(input: &str) -> std::result::Result<OrderBy, String> {
  OrderBy::parse(input).ok_or_else(|| format!("invalid ordering '{}', expected field:asc|desc", input))
}

/// Add or remove the in-use marker on every local asset of `asset_source`.
pub async fn tag_used_assets(
  settings: &AutoTaggingConfig,
  repository: &AssetRepository,
  usage: &dyn UsageSource,
  asset_source: &str,
  quiet: bool,
  out: &mut impl Write,
) -> Result<ExitCode> {
  if !settings.enabled {
    writeln!(out, "Auto-tagging is disabled")?;
    return Ok(ExitCode::FAILURE);
  }

  if !quiet {
    writeln!(
      out,
      "Tagging used assets of asset source \"{}\" via Canto API:",
      asset_source
    )?;
  }

  let mut write_error: Option<std::io::Error> = None;
  let summary = TaggingSynchronizer::new(repository, settings.in_use_tag.as_str())
    .run(usage, asset_source, |item| {
      if write_error.is_none() {
        write_error = write_tag_item(&mut *out, item, quiet).err();
      }
    })
    .await?;
  if let Some(e) = write_error {
    return Err(e.into());
  }

  write_summary(out, &summary, quiet)?;
  Ok(ExitCode::SUCCESS)
}

fn write_tag_item(out: &mut impl Write, item: &TagSyncItem, quiet: bool) -> std::io::Result<()> {
  let asset = &item.asset;
  match &item.outcome {
    TagOutcome::Failed(_) => writeln!(
      out,
      "   error   Asset \"{}\" ({}) could not be accessed via Canto-API",
      asset.label, asset.id
    ),
    _ if quiet => Ok(()),
    TagOutcome::Tagged => writeln!(
      out,
      "   tagged   {} {} ({})",
      asset.label, asset.remote_identifier, asset.usage_count
    ),
    TagOutcome::AlreadyTagged => writeln!(
      out,
      "  (tagged)  {} {} ({})",
      asset.label, asset.remote_identifier, asset.usage_count
    ),
    TagOutcome::Removed => writeln!(out, "   removed {}", asset.label),
    TagOutcome::AlreadyRemoved => writeln!(out, "  (removed) {}", asset.label),
  }
}

fn write_summary(out: &mut impl Write, summary: &BatchSummary, quiet: bool) -> std::io::Result<()> {
  if quiet && summary.failed == 0 {
    return Ok(());
  }
  writeln!(out, "{} processed, {} failed", summary.processed, summary.failed)
}

/// Import mapped custom fields as collections and their values as tags.
pub async fn import_custom_fields(
  mapping: &MappingConfig,
  repository: &AssetRepository,
  store: &dyn TagStore,
  quiet: bool,
  out: &mut impl Write,
) -> Result<ExitCode> {
  if mapping.custom_fields.is_empty() {
    writeln!(out, "No custom fields configured for mapping")?;
    return Ok(ExitCode::FAILURE);
  }

  if !quiet {
    writeln!(out, "Importing custom fields as tags and asset collections via Canto API")?;
  }

  let mut write_error: Option<std::io::Error> = None;
  let summary = TaxonomyImporter::new(repository.client(), store)
    .import_custom_fields(&mapping.custom_fields, |event| {
      if write_error.is_none() {
        write_error = write_taxonomy_event(&mut *out, event, quiet).err();
      }
    })
    .await?;
  if let Some(e) = write_error {
    return Err(e.into());
  }
  write_summary(
    out,
    &BatchSummary {
      processed: summary.changes + summary.unchanged + summary.failed,
      failed: summary.failed,
    },
    quiet,
  )?;
  Ok(ExitCode::SUCCESS)
}

/// Import the first page of the mapped facet's values as tags.
pub async fn import_tags(
  mapping: &MappingConfig,
  repository: &AssetRepository,
  store: &dyn TagStore,
  quiet: bool,
  out: &mut impl Write,
) -> Result<ExitCode> {
  let tag_mapping = match &mapping.tags {
    Some(tags) if !tags.field.is_empty() => tags,
    _ => {
      writeln!(out, "No tags mapping configured")?;
      return Ok(ExitCode::FAILURE);
    }
  };

  if !quiet {
    writeln!(out, "Importing tags via Canto API")?;
  }

  let mut write_error: Option<std::io::Error> = None;
  let summary = TaxonomyImporter::new(repository.client(), store)
    .import_tags(tag_mapping, |event| {
      if write_error.is_none() {
        write_error = write_taxonomy_event(&mut *out, event, quiet).err();
      }
    })
    .await?;
  if let Some(e) = write_error {
    return Err(e.into());
  }
  write_summary(
    out,
    &BatchSummary {
      processed: summary.changes + summary.unchanged + summary.failed,
      failed: summary.failed,
    },
    quiet,
  )?;
  Ok(ExitCode::SUCCESS)
}

fn write_taxonomy_event(out: &mut impl Write, event: &TaxonomyEvent, quiet: bool) -> std::io::Result<()> {
  match event {
    TaxonomyEvent::Failed { value, error } => writeln!(out, "  ! {}: {}", value, error),
    _ if quiet => Ok(()),
    TaxonomyEvent::CollectionCreated { title } => writeln!(out, "+ {}", title),
    TaxonomyEvent::CollectionExists { title } => writeln!(out, "= {}", title),
    TaxonomyEvent::TagCreated { label, .. } => writeln!(out, "  + {}", label),
    TaxonomyEvent::TagAttached { label, .. } => writeln!(out, "  ~ {}", label),
    TaxonomyEvent::TagUnchanged { .. } => Ok(()),
  }
}

/// Print one asset as JSON.
pub async fn show(repository: &AssetRepository, identifier: &str, out: &mut impl Write) -> Result<ExitCode> {
  let record = repository.get_by_identifier(identifier).await?;
  writeln!(out, "{}", serde_json::to_string_pretty(&record)?)?;
  Ok(ExitCode::SUCCESS)
}

/// Run a query with the given filters, or count its matches.
///
/// Type filter, ordering and collection go through the repository
/// defaults; the rest narrows the repository's spec.
pub async fn search(repository: &mut AssetRepository, args: &SearchArgs, out: &mut impl Write) -> Result<ExitCode> {
  repository.filter_by_type(Some(AssetTypeFilter::from(args.type_filter.as_str())));
  repository.order_by(args.sort.clone());
  repository.filter_by_collection(args.collection.clone());

  if args.count {
    let count = match (&args.term, &args.tag) {
      (None, None) if args.untagged => repository.count_untagged().await?,
      (None, None) => repository.count_all().await?,
      _ => repository.find(search_spec(repository, args)).count().await?,
    };
    writeln!(out, "{}", count)?;
    return Ok(ExitCode::SUCCESS);
  }

  let mut result = repository.find(search_spec(repository, args));
  while let Some(record) = result.next_asset().await? {
    writeln!(out, "{}", format_row(&record))?;
  }
  Ok(ExitCode::SUCCESS)
}

fn search_spec(repository: &AssetRepository, args: &SearchArgs) -> QuerySpec {
  let mut spec = repository.query_spec();
  if let Some(term) = &args.term {
    spec.search_term = term.clone();
  }
  if args.untagged {
    spec.untagged = true;
  } else {
    spec.tag = args.tag.clone();
  }
  spec.offset = args.offset;
  if let Some(limit) = args.limit {
    spec.limit = limit;
  }
  spec
}

fn format_row(record: &AssetRecord) -> String {
  format!(
    "{:<16} {:<40} {:<24} {}",
    record.identifier,
    record.label,
    record.media_type,
    record.tags.join(",")
  )
}

/// Record a local asset and its usage count for `tag-used-assets`.
pub fn register_asset(store: &SqliteStore, asset: &LocalAsset, out: &mut impl Write) -> Result<ExitCode> {
  store.upsert_asset(asset)?;
  writeln!(
    out,
    "{} {} ({}) registered for {}",
    asset.label, asset.remote_identifier, asset.usage_count, asset.asset_source
  )?;
  Ok(ExitCode::SUCCESS)
}

/// Print the cached number of assets carrying `label`.
pub async fn count_tag(repository: &AssetRepository, label: &str, out: &mut impl Write) -> Result<ExitCode> {
  let count = repository.count_by_tag(label).await?;
  writeln!(out, "{}", count)?;
  Ok(ExitCode::SUCCESS)
}
