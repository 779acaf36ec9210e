//! Response adapters: turn an endpoint's JSON into normalised results.
//!
//! Each endpoint supplies its own adapter, so the engine never guesses at
//! envelope shapes or id field names.

use serde_json::{Map, Value};
use tracing::warn;

use super::record::{Identifier, Record};
use crate::error::{Error, Result};

/// What the server confirmed about a created record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteReceipt {
  /// Server-assigned id, if the endpoint returns one
  pub id: Option<u64>,
  /// Remaining fields to merge into the record
  pub fields: Map<String, Value>,
}

pub trait ResponseAdapter: Send + Sync {
  /// Records of a list response.
  fn records(&self, response: Value) -> Result<Vec<Record>>;

  /// Receipt of a create response.
  fn receipt(&self, response: Value) -> Result<RemoteReceipt>;
}

/// Adapter for responses that are either a raw value or `{"data": ...}`.
#[derive(Debug, Clone)]
pub struct EnvelopeAdapter {
  id_fields: Vec<&'static str>,
  ignored_fields: Vec<&'static str>,
  expects_list: bool,
}

impl EnvelopeAdapter {
  /// A list endpoint: `null` and non-array payloads become an empty list.
  pub fn list() -> Self {
    Self {
      id_fields: vec!["id"],
      ignored_fields: vec!["message"],
      expects_list: true,
    }
  }

  /// An endpoint returning a single object, replacing the collection with it.
  pub fn single() -> Self {
    Self {
      expects_list: false,
      ..Self::list()
    }
  }

  /// Names to try, in order, when reading the server id of a receipt.
  pub fn with_id_fields(mut self, id_fields: &[&'static str]) -> Self {
    self.id_fields = id_fields.to_vec();
    self
  }

  /// Receipt fields not to merge into the record (status text and the like).
  pub fn with_ignored_fields(mut self, ignored: &[&'static str]) -> Self {
    self.ignored_fields = ignored.to_vec();
    self
  }
}

/// Strip a `{"data": ...}` envelope if there is one.
fn unwrap_envelope(response: Value) -> Value {
  match response {
    Value::Object(mut object) if object.contains_key("data") => {
      object.remove("data").unwrap_or(Value::Null)
    }
    other => other,
  }
}

impl ResponseAdapter for EnvelopeAdapter {
  fn records(&self, response: Value) -> Result<Vec<Record>> {
    match unwrap_envelope(response) {
      Value::Null => Ok(Vec::new()),
      Value::Array(items) => items.into_iter().map(Record::from_json).collect(),
      other if self.expects_list => {
        warn!(payload = %other, "expected a list, treating as empty");
        Ok(Vec::new())
      }
      Value::Object(object) => Ok(vec![Record::from_json(Value::Object(object))?]),
      other => Err(Error::Decode(format!("expected an object, got {}", other))),
    }
  }

  fn receipt(&self, response: Value) -> Result<RemoteReceipt> {
    let object = match unwrap_envelope(response) {
      Value::Object(object) => object,
      Value::Null => return Ok(RemoteReceipt::default()),
      other => return Err(Error::Decode(format!("expected an object, got {}", other))),
    };

    let id = self
      .id_fields
      .iter()
      .find_map(|name| object.get(*name).and_then(Identifier::remote_from_json));
    let fields = object
      .into_iter()
      .filter(|(key, _)| {
        !self.id_fields.contains(&key.as_str()) && !self.ignored_fields.contains(&key.as_str())
      })
      .collect();

    Ok(RemoteReceipt { id, fields })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_records_accept_raw_and_enveloped_lists() {
    let adapter = EnvelopeAdapter::list();
    let raw = adapter.records(json!([{"id": 1, "TODO": "a"}])).unwrap();
    let wrapped = adapter.records(json!({"data": [{"id": 1, "TODO": "a"}]})).unwrap();
    assert_eq!(raw, wrapped);
    assert_eq!(raw[0].id, Identifier::Remote(1));
  }

  #[test]
  fn test_null_and_non_array_become_empty_for_lists() {
    let adapter = EnvelopeAdapter::list();
    assert!(adapter.records(Value::Null).unwrap().is_empty());
    assert!(adapter.records(json!({"data": null})).unwrap().is_empty());
    assert!(adapter.records(json!({"message": "nothing"})).unwrap().is_empty());
  }

  #[test]
  fn test_single_object_is_kept_when_list_not_expected() {
    let adapter = EnvelopeAdapter::single();
    let records = adapter.records(json!({"data": {"id": 3, "TODO": "c"}})).unwrap();
    assert_eq!(records.len(), 1);
    assert!(adapter.records(json!("text")).is_err());
  }

  #[test]
  fn test_receipt_prefers_first_id_field() {
    let adapter = EnvelopeAdapter::list().with_id_fields(&["id", "task_id"]);
    let receipt = adapter
      .receipt(json!({"message": "Task added successfully", "task_id": 17}))
      .unwrap();
    assert_eq!(receipt.id, Some(17));
    assert!(receipt.fields.is_empty());

    let receipt = adapter.receipt(json!({"data": {"id": 4, "task_id": 5}})).unwrap();
    assert_eq!(receipt.id, Some(4));
  }

  #[test]
  fn test_receipt_without_id() {
    let adapter = EnvelopeAdapter::list();
    let receipt = adapter
      .receipt(json!({"message": "Task added successfully", "TODO": "x"}))
      .unwrap();
    assert_eq!(receipt.id, None);
    assert_eq!(receipt.fields.get("TODO"), Some(&json!("x")));
    assert_eq!(adapter.receipt(Value::Null).unwrap(), RemoteReceipt::default());
  }
}
