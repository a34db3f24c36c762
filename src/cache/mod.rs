//! Response caching for remote lookups.
//!
//! This module is Canto-agnostic. It stores opaque serialized snapshots:
//! - raw per-asset payloads, keyed by asset identifier
//! - derived facts (e.g. per-tag counts), keyed by a fingerprint
//!
//! Entries expire after the configured lifetime and can be flushed
//! completely or by tag.

mod storage;

pub use storage::{NoopStorage, ResponseCache, SqliteStorage};

#[cfg(test)]
pub(crate) mod testing;
