//! Append-only event streams with optimistic concurrency.
//!
//! One stream per aggregate instance, keyed by `AggregateId`. The append path
//! is the single linearization point for racing commands on the same
//! aggregate: a stale `ExpectedVersion` fails the append, and the caller
//! reloads and retries.

mod in_memory;
#[path = "trait.rs"]
mod store_trait;

pub use in_memory::InMemoryEventStore;
pub use store_trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};
