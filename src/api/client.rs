//! Task API client routed through the cache policy engine.

use serde_json::Value;
use tracing::{debug, info};
use url::Url;

use super::api_types::{AddTaskRequest, ArchiveRequest, PermDeleteRequest};
use crate::cache::{CachePolicyEngine, CacheSource, CacheStorage};
use crate::error::{Error, Result};
use crate::net::{Request, Transport};
use crate::sync::Identifier;

/// Client for the task REST surface.
///
/// Reads are network-first with offline fallback (they live under the API
/// prefix); writes pass straight through and are never cached.
pub struct TaskApi<S: CacheStorage, T: Transport> {
  engine: CachePolicyEngine<S, T>,
  base: Url,
}

impl<S: CacheStorage, T: Transport> TaskApi<S, T> {
  /// `base` must end with a slash so endpoint names join beneath it.
  pub fn new(engine: CachePolicyEngine<S, T>, base: Url) -> Self {
    Self { engine, base }
  }

  pub fn engine(&self) -> &CachePolicyEngine<S, T> {
    &self.engine
  }

  fn endpoint(&self, path: &str) -> Result<Url> {
    Ok(self.base.join(path)?)
  }

  fn page_endpoint(&self, path: &str, page: u32) -> Result<Url> {
    let mut url = self.endpoint(path)?;
    url.query_pairs_mut().append_pair("page", &page.to_string());
    Ok(url)
  }

  async fn send(&self, request: Request) -> Result<Value> {
    let result = self.engine.fetch(&request).await?;
    if result.source == CacheSource::Offline {
      info!(url = %request.url, cached_at = ?result.cached_at, "serving offline copy");
    }

    let response = result.data.error_for_status()?;
    if response.body.is_empty() {
      return Ok(Value::Null);
    }
    response.json()
  }

  /// List active tasks.
  pub async fn tasks(&self, page: u32) -> Result<Value> {
    self.send(Request::get(self.page_endpoint("tasks", page)?)).await
  }

  /// List archived tasks.
  pub async fn archives(&self, page: u32) -> Result<Value> {
    self
      .send(Request::get(self.page_endpoint("archives", page)?))
      .await
  }

  /// Create a task.
  pub async fn add(&self, description: &str) -> Result<Value> {
    let description = description.trim();
    if description.is_empty() {
      return Err(Error::Validation("task description is required".to_string()));
    }
    let body = AddTaskRequest {
      task_description: description,
    };
    self
      .send(Request::post_json(self.endpoint("add")?, &body)?)
      .await
  }

  /// Move a task to the archive. Unconfirmed tasks are rejected locally.
  pub async fn archive(&self, id: &Identifier) -> Result<Value> {
    let task_id = id.require_remote()?;
    debug!(task_id, "archiving task");
    self
      .send(Request::post_json(
        self.endpoint("archive")?,
        &ArchiveRequest { task_id },
      )?)
      .await
  }

  /// Permanently delete an archived task.
  pub async fn perm_delete(&self, id: &Identifier) -> Result<Value> {
    let archive_id = id.require_remote()?;
    debug!(archive_id, "deleting archived task");
    self
      .send(Request::post_json(
        self.endpoint("perm_delete")?,
        &PermDeleteRequest { archive_id },
      )?)
      .await
  }
}
