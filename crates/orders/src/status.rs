//! Order status transition table.
//!
//! Kept separate from the aggregate because the admin surface (listing,
//! filtering, bulk transitions) is a distinct concern from the one
//! stock-bearing transition (cancellation). Rejecting an invalid transition
//! is a reported error, never a silent no-op.

use serde::{Deserialize, Serialize};

/// Order status lifecycle.
///
/// ```text
/// Pending -> Processing -> Shipped -> Delivered
/// Pending | Processing -> Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }
}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(OrderStatus::Pending),
            "processing" => Ok(OrderStatus::Processing),
            "shipped" => Ok(OrderStatus::Shipped),
            "delivered" => Ok(OrderStatus::Delivered),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(format!("unknown order status: {other}")),
        }
    }
}

/// Payment lifecycle, driven by the external gateway's webhook. Independent of
/// stock commitment: stock commits at order creation regardless of payment
/// outcome, and a failed payment drives cancellation, not a separate stock path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Unpaid,
    Paid,
    Failed,
}

impl core::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// The ordered transition table. Everything not listed here is invalid.
pub const TRANSITIONS: &[(OrderStatus, OrderStatus)] = &[
    (OrderStatus::Pending, OrderStatus::Processing),
    (OrderStatus::Processing, OrderStatus::Shipped),
    (OrderStatus::Shipped, OrderStatus::Delivered),
    (OrderStatus::Pending, OrderStatus::Cancelled),
    (OrderStatus::Processing, OrderStatus::Cancelled),
];

/// Whether `from -> to` appears in the transition table.
pub fn is_valid_transition(from: OrderStatus, to: OrderStatus) -> bool {
    TRANSITIONS.iter().any(|(f, t)| *f == from && *t == to)
}

/// Whether an order in this status may still be cancelled.
pub fn can_cancel(status: OrderStatus) -> bool {
    is_valid_transition(status, OrderStatus::Cancelled)
}
