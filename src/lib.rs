//! Optimistic task-list synchronisation with a tiered offline response cache.
//!
//! - [`sync`]: local collection with optimistic add/update/remove and rollback
//! - [`cache`]: named response cache generations, cache-first / network-first policy
//! - [`api`]: the task REST surface, routed through the cache policy

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod logging;
pub mod net;
pub mod sync;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{Error, Result};
