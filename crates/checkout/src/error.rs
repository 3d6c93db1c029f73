use thiserror::Error;

use storecore_infra::DispatchError;
use storecore_orders::OrderId;
use storecore_stock::UnitId;

/// Application-level error taxonomy.
///
/// Everything a handler needs to pick a status code and an error body is in
/// the variant; the HTTP mapping itself lives in the api crate.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The ledger cannot cover the requested quantity. Nothing was reserved.
    #[error("insufficient stock for unit {unit_id}: requested {requested}, available {available}")]
    InsufficientStock {
        unit_id: UnitId,
        requested: u32,
        available: u32,
    },

    #[error("unknown unit {0}")]
    UnitNotFound(UnitId),

    #[error("unknown order {0}")]
    OrderNotFound(OrderId),

    /// The cart has no line for this unit.
    #[error("no cart line for unit {0}")]
    LineNotFound(UnitId),

    #[error("cart is empty")]
    EmptyCart,

    /// Actor is not the owner and not an administrator.
    #[error("forbidden")]
    Forbidden,

    #[error("order is past the point where cancellation is allowed")]
    CancellationNotAllowed,

    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("{0}")]
    Validation(String),

    /// A command would break a ledger/aggregate invariant (e.g. an adjustment
    /// that drives the counter below zero).
    #[error("{0}")]
    InvariantViolation(String),

    /// Optimistic concurrency retries exhausted; the request may succeed if
    /// simply retried.
    #[error("transient conflict: {0}")]
    Conflict(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Map a dispatch failure on a stock stream.
    pub(crate) fn from_unit_dispatch(unit_id: UnitId, err: DispatchError) -> Self {
        match err {
            DispatchError::InsufficientStock {
                requested,
                available,
            } => ServiceError::InsufficientStock {
                unit_id,
                requested,
                available,
            },
            DispatchError::NotFound => ServiceError::UnitNotFound(unit_id),
            other => Self::from_generic_dispatch(other),
        }
    }

    /// Map a dispatch failure on an order stream.
    pub(crate) fn from_order_dispatch(order_id: OrderId, err: DispatchError) -> Self {
        match err {
            DispatchError::NotFound => ServiceError::OrderNotFound(order_id),
            other => Self::from_generic_dispatch(other),
        }
    }

    pub(crate) fn from_generic_dispatch(err: DispatchError) -> Self {
        match err {
            DispatchError::Concurrency(msg) => ServiceError::Conflict(msg),
            DispatchError::Validation(msg) => ServiceError::Validation(msg),
            DispatchError::InvariantViolation(msg) => ServiceError::InvariantViolation(msg),
            DispatchError::InsufficientStock {
                requested,
                available,
            } => ServiceError::Internal(format!(
                "insufficient stock outside a unit context (requested {requested}, available {available})"
            )),
            DispatchError::InvalidTransition { from, to } => {
                ServiceError::InvalidTransition { from, to }
            }
            DispatchError::CancellationNotAllowed => ServiceError::CancellationNotAllowed,
            DispatchError::Unauthorized => ServiceError::Forbidden,
            DispatchError::NotFound => ServiceError::Validation("not found".to_string()),
            DispatchError::Deserialize(msg) => ServiceError::Internal(msg),
            DispatchError::Store(e) => ServiceError::Internal(e.to_string()),
            DispatchError::Publish(msg) => ServiceError::Internal(msg),
        }
    }
}
