//! Tiered response cache for offline support.
//!
//! This module provides:
//! - Named, versioned storage generations keyed by request identity (method + URL)
//! - A per-request policy: cache-first for static assets, network-first with
//!   offline fallback for API resources
//! - Generation lifecycle: pre-warm on install, evict superseded generations on activate

mod lifecycle;
mod policy;
mod storage;
mod traits;

pub use lifecycle::CacheLifecycleManager;
pub use policy::CachePolicyEngine;
pub use storage::{CacheStorage, NoopStorage, SqliteStorage};
pub use traits::{CacheResult, CacheSource, CachedResponse, RequestIdentity};
