//! Query, cache and retag assets of a Canto DAM.

pub mod cache;
pub mod canto;
pub mod commands;
pub mod config;
pub mod error;
pub mod query;
pub mod store;
pub mod sync;
