use canto_assets::cache::{NoopStorage, ResponseCache, SqliteStorage};
use canto_assets::canto::cache::{ASSET_NAMESPACE, COUNT_NAMESPACE};
use canto_assets::canto::client::HttpCantoClient;
use canto_assets::canto::repository::AssetRepository;
use canto_assets::commands::{self, SearchArgs};
use canto_assets::config::Config;
use canto_assets::store::{LocalAsset, SqliteStore};

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "canto-assets")]
#[command(about = "Query, cache and retag assets of a Canto DAM")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/canto-assets/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Log at debug level
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Write logs to this file instead of stderr
  #[arg(long, global = true)]
  log_file: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Tag Canto assets that are in use locally, untag the others
  TagUsedAssets {
    /// Asset source of the local assets to process
    #[arg(long)]
    asset_source: Option<String>,

    /// Only print errors
    #[arg(short, long)]
    quiet: bool,
  },

  /// Import Canto custom fields as collections and tags
  ImportCustomFields {
    #[arg(short, long)]
    quiet: bool,
  },

  /// Import Canto facet values as tags
  ImportTags {
    #[arg(short, long)]
    quiet: bool,
  },

  /// Print a single asset
  Show {
    /// Asset identifier, e.g. image-42
    identifier: String,
  },

  /// Search assets
  Search(SearchArgs),

  /// Print the number of assets carrying a tag
  CountTag { label: String },

  /// Record a local asset and how often it is used
  RegisterAsset {
    /// Local asset id
    id: String,

    label: String,

    /// Identifier of the asset in Canto, e.g. image-42
    remote_identifier: String,

    #[arg(long, default_value_t = 0)]
    usage_count: u64,

    #[arg(long)]
    asset_source: Option<String>,
  },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
  color_eyre::install()?;

  let args = Args::parse();
  let _guard = init_logging(args.verbose, args.log_file.as_deref())?;

  let config = Config::load(args.config.as_deref())?;

  let stdout = std::io::stdout();
  let mut out = stdout.lock();

  match args.command {
    Command::TagUsedAssets {
      asset_source,
      quiet,
    } => {
      let repository = build_repository(&config)?;
      let store = SqliteStore::open(&config.store_path()?)?;
      let asset_source = asset_source.unwrap_or_else(|| config.canto.asset_source.clone());
      commands::tag_used_assets(
        &config.auto_tagging,
        &repository,
        &store,
        &asset_source,
        quiet,
        &mut out,
      )
      .await
    }
    Command::ImportCustomFields { quiet } => {
      let repository = build_repository(&config)?;
      let store = SqliteStore::open(&config.store_path()?)?;
      commands::import_custom_fields(&config.mapping, &repository, &store, quiet, &mut out).await
    }
    Command::ImportTags { quiet } => {
      let repository = build_repository(&config)?;
      let store = SqliteStore::open(&config.store_path()?)?;
      commands::import_tags(&config.mapping, &repository, &store, quiet, &mut out).await
    }
    Command::Show { identifier } => {
      let repository = build_repository(&config)?;
      commands::show(&repository, &identifier, &mut out).await
    }
    Command::Search(search) => {
      let mut repository = build_repository(&config)?;
      commands::search(&mut repository, &search, &mut out).await
    }
    Command::CountTag { label } => {
      let repository = build_repository(&config)?;
      commands::count_tag(&repository, &label, &mut out).await
    }
    Command::RegisterAsset {
      id,
      label,
      remote_identifier,
      usage_count,
      asset_source,
    } => {
      let store = SqliteStore::open(&config.store_path()?)?;
      let asset = LocalAsset {
        id,
        label,
        asset_source: asset_source.unwrap_or_else(|| config.canto.asset_source.clone()),
        remote_identifier,
        usage_count,
      };
      commands::register_asset(&store, &asset, &mut out)
    }
  }
}

/// Default level is `warn`; `RUST_LOG` overrides it and `--verbose`
/// overrides both.
fn init_logging(verbose: bool, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
  let filter = if verbose {
    EnvFilter::new("debug")
  } else {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
  };

  match log_file {
    Some(path) => {
      let file_name = path
        .file_name()
        .ok_or_else(|| eyre!("Invalid log file path: {}", path.display()))?;
      let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
      let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));

      tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .init();
      Ok(Some(guard))
    }
    None => {
      tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
      Ok(None)
    }
  }
}

fn build_repository(config: &Config) -> Result<AssetRepository> {
  let token = Config::get_access_token()?;
  let client = HttpCantoClient::new(&config.canto, token)?;

  let (asset_cache, count_cache): (Arc<dyn ResponseCache>, Arc<dyn ResponseCache>) = if config.cache.enabled {
    let lifetime = chrono::Duration::seconds(config.cache.lifetime_secs.min(u32::MAX as u64) as i64);
    let assets = SqliteStorage::open(&config.cache_path()?, ASSET_NAMESPACE, lifetime)?;
    let counts = assets.sibling(COUNT_NAMESPACE);
    (Arc::new(assets), Arc::new(counts))
  } else {
    (Arc::new(NoopStorage), Arc::new(NoopStorage))
  };

  Ok(AssetRepository::new(Arc::new(client), asset_cache, count_cache))
}
