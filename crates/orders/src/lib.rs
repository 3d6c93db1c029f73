//! `storecore-orders` — immutable orders and their status lifecycle.
//!
//! An order freezes a cart snapshot at checkout time. Only `status`,
//! `payment_status` and tracking fields mutate afterwards, and every status
//! mutation is validated against the transition table in [`status`].

pub mod order;
pub mod status;

pub use order::{
    Cancel, Order, OrderCommand, OrderEvent, OrderId, OrderLine, PlaceOrder, RecordPayment,
    ShippingAddress, TrackingInfo, UpdateStatus,
};
pub use status::{OrderStatus, PaymentStatus, TRANSITIONS, can_cancel, is_valid_transition};
