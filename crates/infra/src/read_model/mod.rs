//! Disposable key/value read models, rebuildable from the event log.

mod store;

pub use store::{InMemoryReadStore, ReadStore};
