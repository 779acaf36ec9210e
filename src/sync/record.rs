//! Records of the synchronised collection and their identifiers.

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Client-assigned token for a record the server has not confirmed yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalId(pub(crate) u64);

impl fmt::Display for LocalId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "local-{}", self.0)
  }
}

/// A record identifier: either unconfirmed (local) or assigned by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Identifier {
  Local(LocalId),
  Remote(u64),
}

impl Identifier {
  /// Parse a user-supplied identifier. Only server ids can be named from outside.
  pub fn parse(raw: &str) -> Result<Self> {
    raw
      .trim()
      .parse::<u64>()
      .map(Identifier::Remote)
      .map_err(|_| Error::Validation(format!("Cannot convert \"{}\" to a valid task ID", raw)))
  }

  /// The server id, or a validation error while the record is still unconfirmed.
  pub fn require_remote(&self) -> Result<u64> {
    match self {
      Identifier::Remote(id) => Ok(*id),
      Identifier::Local(local) => Err(Error::Validation(format!(
        "Task {} is still saving to server",
        local
      ))),
    }
  }

  pub fn is_local(&self) -> bool {
    matches!(self, Identifier::Local(_))
  }

  /// Read a server id from JSON: a non-negative integer or a numeric string.
  pub fn remote_from_json(value: &Value) -> Option<u64> {
    match value {
      Value::Number(n) => n.as_u64(),
      Value::String(s) => s.trim().parse().ok(),
      _ => None,
    }
  }

  fn to_json(self) -> Value {
    match self {
      Identifier::Remote(id) => Value::from(id),
      Identifier::Local(local) => Value::from(local.to_string()),
    }
  }
}

impl fmt::Display for Identifier {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Identifier::Local(local) => local.fmt(f),
      Identifier::Remote(id) => id.fmt(f),
    }
  }
}

/// One item of the collection: an identifier plus arbitrary payload fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
  pub id: Identifier,
  pub fields: Map<String, Value>,
}

impl Record {
  pub fn new(id: Identifier, fields: Map<String, Value>) -> Self {
    Self { id, fields }
  }

  /// Build a record from a server object. The `id` key becomes the identifier.
  pub fn from_json(value: Value) -> Result<Self> {
    let Value::Object(mut fields) = value else {
      return Err(Error::Decode(format!("expected an object, got {}", value)));
    };
    let id = fields
      .remove("id")
      .as_ref()
      .and_then(Identifier::remote_from_json)
      .ok_or_else(|| Error::Decode("record has no usable id".to_string()))?;
    Ok(Self::new(Identifier::Remote(id), fields))
  }

  pub fn field_str(&self, name: &str) -> Option<&str> {
    self.fields.get(name).and_then(Value::as_str)
  }

  /// Overlay `fields` onto this record; the identifier is never taken from them.
  pub fn merge(&mut self, fields: &Map<String, Value>) {
    for (key, value) in fields {
      if key != "id" {
        self.fields.insert(key.clone(), value.clone());
      }
    }
  }

  pub fn to_json(&self) -> Value {
    let mut object = Map::with_capacity(self.fields.len() + 1);
    object.insert("id".to_string(), self.id.to_json());
    object.extend(self.fields.clone());
    Value::Object(object)
  }
}

/// Immutable view of the collection at one instant.
///
/// Every change produces a new `Arc`, so `Arc::ptr_eq` tells observers whether
/// anything happened.
pub type Snapshot = Arc<Vec<Record>>;

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_parse_accepts_numeric_ids() {
    assert_eq!(Identifier::parse("42").unwrap(), Identifier::Remote(42));
    assert_eq!(Identifier::parse(" 7 ").unwrap(), Identifier::Remote(7));
  }

  #[test]
  fn test_parse_rejects_garbage() {
    let err = Identifier::parse("abc").unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert_eq!(err.message(), "Cannot convert \"abc\" to a valid task ID");
    assert!(Identifier::parse("-1").is_err());
  }

  #[test]
  fn test_local_id_is_not_remote() {
    let id = Identifier::Local(LocalId(3));
    assert!(id.is_local());
    assert!(matches!(id.require_remote(), Err(Error::Validation(_))));
    assert_eq!(Identifier::Remote(9).require_remote().unwrap(), 9);
  }

  #[test]
  fn test_record_from_server_object() {
    let record = Record::from_json(json!({"id": 5, "TODO": "buy milk"})).unwrap();
    assert_eq!(record.id, Identifier::Remote(5));
    assert_eq!(record.field_str("TODO"), Some("buy milk"));
    assert!(!record.fields.contains_key("id"));
    assert_eq!(record.to_json(), json!({"id": 5, "TODO": "buy milk"}));
  }

  #[test]
  fn test_record_without_id_is_rejected() {
    assert!(Record::from_json(json!({"TODO": "x"})).is_err());
    assert!(Record::from_json(json!("x")).is_err());
  }

  #[test]
  fn test_merge_keeps_identifier() {
    let mut record = Record::from_json(json!({"id": 1, "TODO": "a"})).unwrap();
    let patch = json!({"id": 99, "TODO": "b", "done": true});
    record.merge(patch.as_object().unwrap());
    assert_eq!(record.id, Identifier::Remote(1));
    assert_eq!(record.field_str("TODO"), Some("b"));
    assert_eq!(record.fields.get("done"), Some(&json!(true)));
  }
}
