//! Per-request cache policy: cache-first for static assets, network-first with
//! offline fallback for API resources.

use std::sync::Arc;

use tracing::{debug, warn};

use super::storage::CacheStorage;
use super::traits::{CacheResult, RequestIdentity};
use crate::config::CacheConfig;
use crate::error::Result;
use crate::net::{Request, Response, Transport};

/// Cache policy engine that sits between API clients and the transport.
pub struct CachePolicyEngine<S: CacheStorage, T: Transport> {
  storage: Arc<S>,
  transport: Arc<T>,
  config: CacheConfig,
}

impl<S: CacheStorage, T: Transport> CachePolicyEngine<S, T> {
  pub fn new(storage: Arc<S>, transport: Arc<T>, config: CacheConfig) -> Self {
    Self {
      storage,
      transport,
      config,
    }
  }

  pub fn storage(&self) -> &Arc<S> {
    &self.storage
  }

  pub fn transport(&self) -> &Arc<T> {
    &self.transport
  }

  pub fn config(&self) -> &CacheConfig {
    &self.config
  }

  /// Serve a request according to its classification.
  pub async fn fetch(&self, request: &Request) -> Result<CacheResult<Response>> {
    if self.config.is_api_resource(&request.url) {
      self.network_first(request).await
    } else {
      self.cache_first(request).await
    }
  }

  /// Cache-first strategy.
  ///
  /// 1. Check every generation - on a hit, return without touching the network
  /// 2. On a miss, fetch from network
  /// 3. Store 2xx responses in the static generation
  /// 4. Network failures propagate; there is nothing to fall back to
  async fn cache_first(&self, request: &Request) -> Result<CacheResult<Response>> {
    if !request.is_read_only() {
      return Ok(CacheResult::from_network(self.transport.send(request).await?));
    }

    let identity = request.identity();
    if let Some(cached) = self.storage.match_any(&identity)? {
      debug!(request = %identity.description(), generation = %cached.generation, "cache hit");
      return Ok(CacheResult::from_cache(cached.response, cached.cached_at));
    }

    debug!(request = %identity.description(), "cache miss");
    let response = self.transport.send(request).await?;
    if response.is_success() {
      self.store(&self.config.generations.static_assets, &identity, &response);
    }
    Ok(CacheResult::from_network(response))
  }

  /// Network-first strategy with offline fallback.
  ///
  /// 1. Always try the network
  /// 2. Store 2xx GET responses in the api generation
  /// 3. If no response was obtained, serve the api generation's copy (offline mode)
  ///
  /// Error statuses are a response, so they are returned as-is and never fall back.
  async fn network_first(&self, request: &Request) -> Result<CacheResult<Response>> {
    let identity = request.identity();
    let generation = &self.config.generations.api;

    match self.transport.send(request).await {
      Ok(response) => {
        if request.is_read_only() && response.is_success() {
          self.store(generation, &identity, &response);
        }
        Ok(CacheResult::from_network(response))
      }
      Err(err) if err.is_network() && request.is_read_only() => {
        match self.storage.get(generation, &identity)? {
          Some(cached) => {
            warn!(
              request = %identity.description(),
              error = %err,
              "network unavailable, serving cached response"
            );
            Ok(CacheResult::offline(cached.response, cached.cached_at))
          }
          None => Err(err),
        }
      }
      Err(err) => Err(err),
    }
  }

  /// A failed write must not fail a response the caller already has.
  fn store(&self, generation: &str, identity: &RequestIdentity, response: &Response) {
    if let Err(e) = self.storage.put(generation, identity, response) {
      warn!(request = %identity.description(), error = %e, "failed to store response");
    }
  }
}

impl<S: CacheStorage, T: Transport> Clone for CachePolicyEngine<S, T> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      transport: Arc::clone(&self.transport),
      config: self.config.clone(),
    }
  }
}
