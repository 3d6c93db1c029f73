//! `storecore-checkout` — application services orchestrating stock, cart and
//! orders.
//!
//! The domain crates each own a single aggregate; this crate owns the
//! cross-aggregate choreography: every cart mutation is paired with the
//! matching ledger reserve/release, checkout freezes the cart into an order,
//! and cancellation is the one path that returns committed stock.
//!
//! Cross-aggregate sequences are not transactional. Each step is linearized by
//! its own stream's optimistic append; the services order the steps so that a
//! crash between them never under-reports stock (an orphaned reservation can
//! be released, oversold stock cannot be recalled).

mod cart_service;
mod error;
mod order_service;
mod retry;
mod stock_service;

pub use cart_service::CartService;
pub use error::ServiceError;
pub use order_service::{CheckoutRequest, OrderService, StatusUpdate};
pub use stock_service::{NewUnit, StockService};
