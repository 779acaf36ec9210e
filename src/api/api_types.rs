//! Request bodies and per-endpoint response adapters for the task API.

use serde::Serialize;

use crate::sync::EnvelopeAdapter;

#[derive(Debug, Serialize)]
pub struct AddTaskRequest<'a> {
  pub task_description: &'a str,
}

#[derive(Debug, Serialize)]
pub struct ArchiveRequest {
  pub task_id: u64,
}

#[derive(Debug, Serialize)]
pub struct PermDeleteRequest {
  pub archive_id: u64,
}

/// `GET /tasks` and `GET /archives`: a list of `{id, ...}` objects.
pub fn list_adapter() -> EnvelopeAdapter {
  EnvelopeAdapter::list()
}

/// `POST /add`: `{message, id | task_id}`.
pub fn add_adapter() -> EnvelopeAdapter {
  EnvelopeAdapter::list().with_id_fields(&["id", "task_id"])
}

/// `POST /archive`: `{message, archived_task_id}`.
pub fn archive_adapter() -> EnvelopeAdapter {
  EnvelopeAdapter::list().with_id_fields(&["archived_task_id"])
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::sync::ResponseAdapter;
  use serde_json::json;

  #[test]
  fn test_request_bodies_match_backend_fields() {
    assert_eq!(
      serde_json::to_value(AddTaskRequest {
        task_description: "buy milk"
      })
      .unwrap(),
      json!({"task_description": "buy milk"})
    );
    assert_eq!(
      serde_json::to_value(ArchiveRequest { task_id: 3 }).unwrap(),
      json!({"task_id": 3})
    );
    assert_eq!(
      serde_json::to_value(PermDeleteRequest { archive_id: 9 }).unwrap(),
      json!({"archive_id": 9})
    );
  }

  #[test]
  fn test_archive_receipt_reads_archived_id() {
    let receipt = archive_adapter()
      .receipt(json!({"message": "Task archived successfully", "archived_task_id": 12}))
      .unwrap();
    assert_eq!(receipt.id, Some(12));
  }
}
