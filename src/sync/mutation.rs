//! Optimistic mutation cache.
//!
//! Edits are applied to the local snapshot immediately and later either
//! committed (reconciled with the server's answer) or rolled back.
//!
//! Two rollback strategies are available:
//! - `PerOperation`: every [`PendingOperation`] carries its own inverse, so
//!   overlapping operations on different records undo independently.
//! - `LatestSnapshot`: a single rollback slot holding the state before the most
//!   recent apply. Overlapping operations clobber each other's slot; callers
//!   must serialise mutations for rollback to be exact.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::adapter::RemoteReceipt;
use super::record::{Identifier, LocalId, Record, Snapshot};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackStrategy {
  #[default]
  PerOperation,
  LatestSnapshot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
  Add,
  Update,
  Remove,
}

/// A speculative edit to the collection.
#[derive(Debug, Clone)]
pub enum Mutation {
  Add(Map<String, Value>),
  Update {
    id: Identifier,
    fields: Map<String, Value>,
  },
  Remove {
    id: Identifier,
  },
}

impl Mutation {
  pub fn kind(&self) -> MutationKind {
    match self {
      Mutation::Add(_) => MutationKind::Add,
      Mutation::Update { .. } => MutationKind::Update,
      Mutation::Remove { .. } => MutationKind::Remove,
    }
  }
}

/// How to take back one operation's effect.
#[derive(Debug, Clone)]
enum Undo {
  /// Drop the record an add introduced
  Discard(LocalId),
  /// Put removed records back at their former positions (ascending)
  Restore(Vec<(usize, Record)>),
  /// Return an updated record to its previous version
  Revert(Record),
  Nothing,
}

/// An applied but unconfirmed operation.
///
/// Consumed by [`MutationCache::commit`] or [`MutationCache::rollback`], so an
/// operation settles exactly once.
#[derive(Debug)]
pub struct PendingOperation {
  kind: MutationKind,
  record: Option<Record>,
  before: Snapshot,
  undo: Undo,
}

impl PendingOperation {
  pub fn kind(&self) -> MutationKind {
    self.kind
  }

  /// The record as it looked right after the optimistic edit.
  pub fn record(&self) -> Option<&Record> {
    self.record.as_ref()
  }

  /// The collection as it was just before this operation.
  pub fn before(&self) -> &Snapshot {
    &self.before
  }

  pub fn local_id(&self) -> Option<LocalId> {
    match self.undo {
      Undo::Discard(local) => Some(local),
      _ => None,
    }
  }
}

/// In-memory collection with speculative edits.
#[derive(Debug)]
pub struct MutationCache {
  snapshot: Snapshot,
  rollback_slot: Option<Snapshot>,
  strategy: RollbackStrategy,
  next_local: u64,
}

impl MutationCache {
  pub fn new(strategy: RollbackStrategy) -> Self {
    Self {
      snapshot: Arc::new(Vec::new()),
      rollback_slot: None,
      strategy,
      next_local: 1,
    }
  }

  pub fn strategy(&self) -> RollbackStrategy {
    self.strategy
  }

  pub fn snapshot(&self) -> Snapshot {
    Arc::clone(&self.snapshot)
  }

  /// True while the single-slot strategy holds a rollback point.
  pub fn has_rollback_point(&self) -> bool {
    self.rollback_slot.is_some()
  }

  /// Replace the whole collection, e.g. after a full read.
  pub fn replace(&mut self, records: Vec<Record>) {
    self.snapshot = Arc::new(records);
  }

  /// Apply `mutation` to the local view immediately.
  ///
  /// Every call replaces the snapshot reference, even when nothing matched.
  pub fn optimistic_apply(&mut self, mutation: Mutation) -> PendingOperation {
    let before = Arc::clone(&self.snapshot);
    let kind = mutation.kind();
    let mut records: Vec<Record> = before.as_ref().clone();

    let (record, undo) = match mutation {
      Mutation::Add(fields) => {
        let local = LocalId(self.next_local);
        self.next_local += 1;
        let record = Record::new(Identifier::Local(local), fields);
        records.push(record.clone());
        debug!(id = %local, "optimistic add");
        (Some(record), Undo::Discard(local))
      }
      Mutation::Remove { id } => {
        let mut removed = Vec::new();
        let mut kept = Vec::with_capacity(records.len());
        for (index, record) in records.into_iter().enumerate() {
          if record.id == id {
            removed.push((index, record));
          } else {
            kept.push(record);
          }
        }
        records = kept;
        debug!(id = %id, removed = removed.len(), "optimistic remove");
        let first = removed.first().map(|(_, r)| r.clone());
        (first, Undo::Restore(removed))
      }
      Mutation::Update { id, fields } => {
        let mut result = (None, Undo::Nothing);
        if let Some(record) = records.iter_mut().find(|r| r.id == id) {
          let previous = record.clone();
          record.merge(&fields);
          result = (Some(record.clone()), Undo::Revert(previous));
        }
        debug!(id = %id, matched = result.0.is_some(), "optimistic update");
        result
      }
    };

    self.rollback_slot = Some(Arc::clone(&before));
    self.snapshot = Arc::new(records);

    PendingOperation {
      kind,
      record,
      before,
      undo,
    }
  }

  /// Reconcile a confirmed operation.
  ///
  /// For an add, the local id is swapped for the server id and the server's
  /// fields are merged in. Without a server id the record stays local.
  pub fn commit(&mut self, op: PendingOperation, receipt: Option<RemoteReceipt>) {
    self.clear_rollback_point();

    let Some(local) = op.local_id() else {
      return;
    };
    let Some(receipt) = receipt else {
      warn!(id = %local, "add confirmed without a response body, record stays local");
      return;
    };
    let Some(remote) = receipt.id else {
      warn!(id = %local, "add confirmed without a server id, record stays local");
      return;
    };

    let mut records: Vec<Record> = self.snapshot.as_ref().clone();
    match records
      .iter_mut()
      .find(|r| r.id == Identifier::Local(local))
    {
      Some(record) => {
        record.id = Identifier::Remote(remote);
        record.merge(&receipt.fields);
        debug!(local = %local, remote, "promoted local id");
      }
      None => debug!(id = %local, "confirmed record no longer in snapshot"),
    }
    self.snapshot = Arc::new(records);
  }

  /// Undo a failed operation.
  pub fn rollback(&mut self, op: PendingOperation) {
    match self.strategy {
      RollbackStrategy::LatestSnapshot => match self.rollback_slot.take() {
        Some(before) => self.snapshot = before,
        None => debug!("rollback with no rollback point ignored"),
      },
      RollbackStrategy::PerOperation => {
        // keep the single slot coherent for has_rollback_point()
        self.rollback_slot = None;
        let mut records: Vec<Record> = self.snapshot.as_ref().clone();
        match op.undo {
          Undo::Discard(local) => records.retain(|r| r.id != Identifier::Local(local)),
          Undo::Restore(removed) => {
            for (index, record) in removed {
              if records.iter().any(|r| r.id == record.id) {
                continue;
              }
              let at = index.min(records.len());
              records.insert(at, record);
            }
          }
          Undo::Revert(previous) => {
            if let Some(record) = records.iter_mut().find(|r| r.id == previous.id) {
              *record = previous;
            }
          }
          Undo::Nothing => {}
        }
        self.snapshot = Arc::new(records);
      }
    }
  }

  fn clear_rollback_point(&mut self) {
    if self.rollback_slot.take().is_none() {
      debug!("commit with no rollback point");
    }
  }
}
