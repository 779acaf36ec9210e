//! Cache generation lifecycle: pre-warm on install, evict on activate.

use std::sync::Arc;

use futures::future::try_join_all;
use tracing::{debug, info};
use url::Url;

use super::storage::CacheStorage;
use super::traits::RequestIdentity;
use crate::config::CacheConfig;
use crate::error::{Error, Result};
use crate::net::{Request, Response, Transport};

/// Provisions and garbage-collects cache generations.
pub struct CacheLifecycleManager<S: CacheStorage> {
  storage: Arc<S>,
  config: CacheConfig,
}

impl<S: CacheStorage> CacheLifecycleManager<S> {
  pub fn new(storage: Arc<S>, config: CacheConfig) -> Self {
    Self { storage, config }
  }

  /// Open the static generation and pre-warm it with the application shell.
  ///
  /// All-or-nothing: every listed resource must come back 2xx, otherwise the
  /// install fails and nothing is stored. Returns the number of stored entries.
  pub async fn install<T: Transport>(&self, transport: &T, base: &Url) -> Result<usize> {
    let generation = &self.config.generations.static_assets;
    self.storage.open_generation(generation)?;

    let requests = self
      .config
      .precache
      .iter()
      .map(|path| -> Result<Request> { Ok(Request::get(base.join(path)?)) })
      .collect::<Result<Vec<_>>>()?;

    let entries: Vec<(RequestIdentity, Response)> =
      try_join_all(requests.iter().map(|request| async move {
        let response = transport.send(request).await?;
        if !response.is_success() {
          return Err(Error::Server {
            status: response.status,
            message: format!("failed to pre-cache {}", request.url),
          });
        }
        debug!(url = %request.url, "pre-cached");
        Ok::<_, Error>((request.identity(), response))
      }))
      .await?;

    self.storage.put_all(generation, &entries)?;
    info!(generation = %generation, entries = entries.len(), "cache installed");
    Ok(entries.len())
  }

  /// Delete every generation not named in `allow_list`. Returns the deleted names.
  pub fn activate(&self, allow_list: &[String]) -> Result<Vec<String>> {
    let mut deleted = Vec::new();
    for name in self.storage.generation_names()? {
      if allow_list.contains(&name) {
        continue;
      }
      if self.storage.delete_generation(&name)? {
        info!(generation = %name, "deleted stale cache generation");
        deleted.push(name);
      }
    }
    Ok(deleted)
  }

  /// Activate with the configured generation names.
  pub fn activate_current(&self) -> Result<Vec<String>> {
    self.activate(&self.config.allow_list())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::SqliteStorage;
  use crate::testing::FakeTransport;

  fn base() -> Url {
    Url::parse("http://localhost:5000/").unwrap()
  }

  fn config() -> CacheConfig {
    CacheConfig {
      precache: vec!["./".to_string(), "./index.html".to_string(), "./app.js".to_string()],
      ..CacheConfig::default()
    }
  }

  fn manager() -> CacheLifecycleManager<SqliteStorage> {
    CacheLifecycleManager::new(Arc::new(SqliteStorage::open_in_memory().unwrap()), config())
  }

  fn serve_shell(transport: &FakeTransport) {
    transport.route("GET", "http://localhost:5000/", Response::new(200, "root"));
    transport.route("GET", "http://localhost:5000/index.html", Response::new(200, "index"));
    transport.route("GET", "http://localhost:5000/app.js", Response::new(200, "js"));
  }

  #[tokio::test]
  async fn test_install_prewarms_static_generation() {
    let manager = manager();
    let transport = FakeTransport::new();
    serve_shell(&transport);

    let stored = manager.install(&transport, &base()).await.unwrap();

    assert_eq!(stored, 3);
    assert_eq!(manager.storage.entry_count("tasksync-static-v1").unwrap(), 3);
  }

  #[tokio::test]
  async fn test_install_is_all_or_nothing() {
    let manager = manager();
    let transport = FakeTransport::new();
    serve_shell(&transport);
    transport.route("GET", "http://localhost:5000/app.js", Response::new(404, "gone"));

    let err = manager.install(&transport, &base()).await.unwrap_err();

    assert!(matches!(err, Error::Server { status: 404, .. }));
    assert_eq!(manager.storage.entry_count("tasksync-static-v1").unwrap(), 0);
  }

  #[tokio::test]
  async fn test_install_fails_when_unreachable() {
    let manager = manager();
    let transport = FakeTransport::new();
    transport.set_offline(true);

    assert!(manager.install(&transport, &base()).await.unwrap_err().is_network());
    assert_eq!(manager.storage.entry_count("tasksync-static-v1").unwrap(), 0);
  }

  #[test]
  fn test_activate_evicts_superseded_generations() {
    let manager = manager();
    let key = RequestIdentity::new("GET", "http://localhost:5000/index.html");
    for generation in ["static-v0", "tasksync-static-v1", "tasksync-api-v1", "api-v0"] {
      manager
        .storage
        .put(generation, &key, &Response::new(200, generation))
        .unwrap();
    }

    let deleted = manager.activate_current().unwrap();

    assert_eq!(deleted, vec!["static-v0".to_string(), "api-v0".to_string()]);
    assert_eq!(
      manager.storage.generation_names().unwrap(),
      vec!["tasksync-static-v1".to_string(), "tasksync-api-v1".to_string()]
    );
    assert!(manager.storage.get("static-v0", &key).unwrap().is_none());
    let hit = manager.storage.match_any(&key).unwrap().unwrap();
    assert_eq!(hit.generation, "tasksync-static-v1");
  }

  #[test]
  fn test_activate_with_nothing_stale_is_noop() {
    let manager = manager();
    manager.storage.open_generation("tasksync-static-v1").unwrap();
    assert!(manager.activate_current().unwrap().is_empty());
  }
}
