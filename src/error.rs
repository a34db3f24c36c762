//! Error types for talking to Canto and caching its answers.
//!
//! Single-record lookups surface every variant to the caller. Batch
//! commands catch them per item and keep going.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
  /// The credential could not produce an authenticated call (missing,
  /// expired or rejected token).
  #[error("authentication failed: {0}")]
  Authentication(String),

  /// The remote service could not be reached, or answered with a
  /// status that is neither success nor an auth failure.
  #[error("connection to Canto failed: {0}")]
  Connection(String),

  /// The service answered, but the payload is not an asset.
  #[error("asset not found: {0}")]
  AssetNotFound(String),

  /// A raw record lacks a required field or carries an unreadable value.
  #[error("failed to parse asset {identifier}: {message}")]
  Parse { identifier: String, message: String },

  #[error("cache error: {0}")]
  Cache(String),

  #[error("store error: {0}")]
  Store(String),
}

impl Error {
  pub fn parse(identifier: impl Into<String>, message: impl Into<String>) -> Self {
    Error::Parse {
      identifier: identifier.into(),
      message: message.into(),
    }
  }

  /// Transport and auth failures; the only kinds the tag count cache
  /// downgrades to an unknown result.
  pub fn is_remote_failure(&self) -> bool {
    matches!(self, Error::Authentication(_) | Error::Connection(_))
  }
}

impl From<reqwest::Error> for Error {
  fn from(err: reqwest::Error) -> Self {
    match err.status() {
      Some(status) if status.as_u16() == 401 || status.as_u16() == 403 => {
        Error::Authentication(err.to_string())
      }
      _ => Error::Connection(err.to_string()),
    }
  }
}
