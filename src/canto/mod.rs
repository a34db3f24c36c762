//! Canto DAM access: raw API shapes, the HTTP client, domain types and
//! the cached asset repository.

pub mod api_types;
pub mod cache;
pub mod client;
pub mod repository;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;
