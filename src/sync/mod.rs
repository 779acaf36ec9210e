//! Optimistic synchronisation of a server-backed collection.
//!
//! Mutations are shown locally at once and reconciled with the server's answer:
//! committed on success (promoting local ids to server ids), rolled back on failure.

mod adapter;
mod engine;
mod mutation;
mod record;

pub use adapter::{EnvelopeAdapter, RemoteReceipt, ResponseAdapter};
pub use engine::{SyncEngine, SyncStatus};
pub use mutation::{Mutation, MutationCache, MutationKind, PendingOperation, RollbackStrategy};
pub use record::{Identifier, LocalId, Record, Snapshot};
