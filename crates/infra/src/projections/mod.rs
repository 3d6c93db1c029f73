//! Event-driven projections for display reads.
//!
//! Projections consume committed event envelopes from the bus and maintain
//! denormalized read models. They are eventually consistent: product pages and
//! order lists may briefly trail the ledger, but every reservation decision
//! runs against the rehydrated aggregate, never against these models.

mod orders;
mod stock_levels;

pub use orders::{OrderReadModel, OrdersProjection, OrdersProjectionError};
pub use stock_levels::{StockLevelReadModel, StockLevelsProjection, StockLevelsProjectionError};
