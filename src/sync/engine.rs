//! Orchestrates reads and optimistic writes around the mutation cache.
//!
//! The engine is shared by reference between tasks. Its state lock is only held
//! for the synchronous apply/commit/rollback steps, never across a remote call,
//! so remote calls complete in any order.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, warn};

use super::adapter::ResponseAdapter;
use super::mutation::{Mutation, MutationCache, MutationKind, RollbackStrategy};
use super::record::Snapshot;
use crate::error::{Error, Result};

/// The engine's remote activity.
///
/// The two flags move independently: reads own `loading`, and any failed call
/// records `error`. Only the start of a read clears `error`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStatus {
  /// A full read is in flight
  pub loading: bool,
  /// Message of the last failure
  pub error: Option<String>,
}

impl SyncStatus {
  pub fn is_loading(&self) -> bool {
    self.loading
  }

  pub fn error(&self) -> Option<&str> {
    self.error.as_deref()
  }
}

/// Entry point for collaborators that display and mutate the collection.
pub struct SyncEngine {
  cache: Mutex<MutationCache>,
  snapshot_tx: watch::Sender<Snapshot>,
  status_tx: watch::Sender<SyncStatus>,
}

impl SyncEngine {
  pub fn new(strategy: RollbackStrategy) -> Self {
    let cache = MutationCache::new(strategy);
    let (snapshot_tx, _) = watch::channel(cache.snapshot());
    let (status_tx, _) = watch::channel(SyncStatus::default());
    Self {
      cache: Mutex::new(cache),
      snapshot_tx,
      status_tx,
    }
  }

  /// Current collection.
  pub fn snapshot(&self) -> Snapshot {
    Arc::clone(&self.snapshot_tx.borrow())
  }

  pub fn status(&self) -> SyncStatus {
    self.status_tx.borrow().clone()
  }

  /// Receive every new snapshot. Each change is a distinct `Arc`.
  pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
    self.snapshot_tx.subscribe()
  }

  pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
    self.status_tx.subscribe()
  }

  /// Load the whole collection and replace the snapshot with it.
  ///
  /// Returns the raw remote response. Reads never roll back: on failure the
  /// snapshot is left as it was and the error is recorded and returned.
  pub async fn fetch_data<A, F, Fut>(&self, adapter: &A, remote_call: F) -> Result<Value>
  where
    A: ResponseAdapter + ?Sized,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Value>>,
  {
    self.status_tx.send_modify(|status| {
      status.loading = true;
      status.error = None;
    });

    let result = self.load(adapter, remote_call).await;

    self.status_tx.send_modify(|status| {
      status.loading = false;
      if let Err(e) = &result {
        status.error = Some(e.message());
      }
    });
    result
  }

  async fn load<A, F, Fut>(&self, adapter: &A, remote_call: F) -> Result<Value>
  where
    A: ResponseAdapter + ?Sized,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Value>>,
  {
    let response = remote_call().await?;
    let records = adapter.records(response.clone())?;
    debug!(records = records.len(), "collection loaded");
    self.with_cache(|cache| cache.replace(records))?;
    Ok(response)
  }

  /// Apply `mutation` locally, run `remote_call`, then commit or roll back.
  ///
  /// Returns the raw remote response. On failure the local edit is undone and
  /// the error is recorded in the status and returned unchanged. The loading
  /// flag belongs to reads and is left alone.
  pub async fn optimistic_update<A, F, Fut>(
    &self,
    mutation: Mutation,
    adapter: &A,
    remote_call: F,
  ) -> Result<Value>
  where
    A: ResponseAdapter + ?Sized,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Value>>,
  {
    let op = self.with_cache(|cache| cache.optimistic_apply(mutation))?;
    let kind = op.kind();

    match remote_call().await {
      Ok(response) => {
        let receipt = if kind == MutationKind::Add {
          match adapter.receipt(response.clone()) {
            Ok(receipt) => Some(receipt),
            Err(e) => {
              warn!(error = %e, "unreadable add response, record stays local");
              None
            }
          }
        } else {
          None
        };
        self.with_cache(|cache| cache.commit(op, receipt))?;
        Ok(response)
      }
      Err(e) => {
        warn!(?kind, error = %e, "remote call failed, rolling back");
        self.with_cache(|cache| cache.rollback(op))?;
        self
          .status_tx
          .send_modify(|status| status.error = Some(e.message()));
        Err(e)
      }
    }
  }

  /// Run `f` under the state lock and publish the snapshot if it changed.
  fn with_cache<R>(&self, f: impl FnOnce(&mut MutationCache) -> R) -> Result<R> {
    let mut cache = self.lock()?;
    let before = cache.snapshot();
    let result = f(&mut cache);
    let after = cache.snapshot();
    drop(cache);

    if !Arc::ptr_eq(&before, &after) {
      self.snapshot_tx.send_replace(after);
    }
    Ok(result)
  }

  fn lock(&self) -> Result<MutexGuard<'_, MutationCache>> {
    self
      .cache
      .lock()
      .map_err(|e| Error::Poisoned(e.to_string()))
  }
}
