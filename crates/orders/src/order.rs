use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use storecore_core::{Aggregate, AggregateId, AggregateRoot, DomainError, ShopperId};
use storecore_events::Event;
use storecore_stock::UnitId;

use crate::status::{self, OrderStatus, PaymentStatus};

/// Order identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub AggregateId);

impl OrderId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for OrderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// A frozen copy of a cart line. The quantity is *committed* stock, no longer
/// a reservation; it returns to the ledger only through cancellation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub unit_id: UnitId,
    pub quantity: u32,
    pub unit_price: u64,
    pub color_label: Option<String>,
    pub size_label: Option<String>,
}

impl OrderLine {
    pub fn line_total(&self) -> u64 {
        u64::from(self.quantity) * self.unit_price
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub full_name: String,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub postal_code: String,
    pub country: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingInfo {
    pub tracking_number: String,
    pub tracking_url: Option<String>,
}

/// Aggregate root: Order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    id: OrderId,
    order_number: String,
    shopper_id: Option<ShopperId>,
    status: OrderStatus,
    payment_status: PaymentStatus,
    lines: Vec<OrderLine>,
    total: u64,
    shipping_address: Option<ShippingAddress>,
    payment_method: String,
    notes: Option<String>,
    tracking: Option<TrackingInfo>,
    created_at: Option<DateTime<Utc>>,
    shipped_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Order {
    /// Create an empty, not-yet-placed aggregate instance for rehydration.
    pub fn empty(id: OrderId) -> Self {
        Self {
            id,
            order_number: String::new(),
            shopper_id: None,
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Unpaid,
            lines: Vec::new(),
            total: 0,
            shipping_address: None,
            payment_method: String::new(),
            notes: None,
            tracking: None,
            created_at: None,
            shipped_at: None,
            delivered_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> OrderId {
        self.id
    }

    pub fn is_placed(&self) -> bool {
        self.created
    }

    pub fn order_number(&self) -> &str {
        &self.order_number
    }

    pub fn shopper_id(&self) -> Option<ShopperId> {
        self.shopper_id
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn payment_status(&self) -> PaymentStatus {
        self.payment_status
    }

    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn shipping_address(&self) -> Option<&ShippingAddress> {
        self.shipping_address.as_ref()
    }

    pub fn tracking(&self) -> Option<&TrackingInfo> {
        self.tracking.as_ref()
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn shipped_at(&self) -> Option<DateTime<Utc>> {
        self.shipped_at
    }

    pub fn delivered_at(&self) -> Option<DateTime<Utc>> {
        self.delivered_at
    }

    pub fn is_cancellable(&self) -> bool {
        status::can_cancel(self.status)
    }
}

impl AggregateRoot for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: PlaceOrder (checkout; lines arrive already reserved).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrder {
    pub order_id: OrderId,
    pub order_number: String,
    pub shopper_id: ShopperId,
    pub lines: Vec<OrderLine>,
    pub shipping_address: ShippingAddress,
    pub payment_method: String,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Cancel (the only stock-bearing transition; the caller releases
/// the committed quantities after this succeeds).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cancel {
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateStatus (administrative transition, no stock effect).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateStatus {
    pub order_id: OrderId,
    pub new_status: OrderStatus,
    pub tracking: Option<TrackingInfo>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordPayment (gateway webhook outcome).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPayment {
    pub order_id: OrderId,
    pub outcome: PaymentStatus,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderCommand {
    PlaceOrder(PlaceOrder),
    Cancel(Cancel),
    UpdateStatus(UpdateStatus),
    RecordPayment(RecordPayment),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderEvent {
    OrderPlaced {
        order_id: OrderId,
        order_number: String,
        shopper_id: ShopperId,
        lines: Vec<OrderLine>,
        total: u64,
        shipping_address: ShippingAddress,
        payment_method: String,
        notes: Option<String>,
        occurred_at: DateTime<Utc>,
    },
    OrderCancelled {
        order_id: OrderId,
        occurred_at: DateTime<Utc>,
    },
    StatusChanged {
        order_id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
        tracking: Option<TrackingInfo>,
        occurred_at: DateTime<Utc>,
    },
    PaymentRecorded {
        order_id: OrderId,
        outcome: PaymentStatus,
        occurred_at: DateTime<Utc>,
    },
}

impl Event for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderPlaced { .. } => "orders.order.placed",
            OrderEvent::OrderCancelled { .. } => "orders.order.cancelled",
            OrderEvent::StatusChanged { .. } => "orders.order.status_changed",
            OrderEvent::PaymentRecorded { .. } => "orders.order.payment_recorded",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OrderEvent::OrderPlaced { occurred_at, .. }
            | OrderEvent::OrderCancelled { occurred_at, .. }
            | OrderEvent::StatusChanged { occurred_at, .. }
            | OrderEvent::PaymentRecorded { occurred_at, .. } => *occurred_at,
        }
    }
}

impl Aggregate for Order {
    type Command = OrderCommand;
    type Event = OrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            OrderEvent::OrderPlaced {
                order_id,
                order_number,
                shopper_id,
                lines,
                total,
                shipping_address,
                payment_method,
                notes,
                occurred_at,
            } => {
                self.id = *order_id;
                self.order_number = order_number.clone();
                self.shopper_id = Some(*shopper_id);
                self.status = OrderStatus::Pending;
                self.payment_status = PaymentStatus::Unpaid;
                self.lines = lines.clone();
                self.total = *total;
                self.shipping_address = Some(shipping_address.clone());
                self.payment_method = payment_method.clone();
                self.notes = notes.clone();
                self.created_at = Some(*occurred_at);
                self.created = true;
            }
            OrderEvent::OrderCancelled { .. } => {
                self.status = OrderStatus::Cancelled;
            }
            OrderEvent::StatusChanged {
                to,
                tracking,
                occurred_at,
                ..
            } => {
                self.status = *to;
                if tracking.is_some() {
                    self.tracking = tracking.clone();
                }
                match to {
                    OrderStatus::Shipped => self.shipped_at = Some(*occurred_at),
                    OrderStatus::Delivered => self.delivered_at = Some(*occurred_at),
                    _ => {}
                }
            }
            OrderEvent::PaymentRecorded { outcome, .. } => {
                self.payment_status = *outcome;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            OrderCommand::PlaceOrder(cmd) => self.handle_place(cmd),
            OrderCommand::Cancel(cmd) => self.handle_cancel(cmd),
            OrderCommand::UpdateStatus(cmd) => self.handle_update_status(cmd),
            OrderCommand::RecordPayment(cmd) => self.handle_record_payment(cmd),
        }
    }
}

impl Order {
    fn ensure_order_id(&self, order_id: OrderId) -> Result<(), DomainError> {
        if self.id != order_id {
            return Err(DomainError::invariant("order_id mismatch"));
        }
        Ok(())
    }

    fn handle_place(&self, cmd: &PlaceOrder) -> Result<Vec<OrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("order already placed"));
        }
        if cmd.lines.is_empty() {
            return Err(DomainError::validation("order must have at least one line"));
        }
        if cmd.lines.iter().any(|l| l.quantity == 0) {
            return Err(DomainError::validation("line quantity must be positive"));
        }
        if cmd.order_number.trim().is_empty() {
            return Err(DomainError::validation("order_number cannot be empty"));
        }

        let total = cmd.lines.iter().map(OrderLine::line_total).sum();

        Ok(vec![OrderEvent::OrderPlaced {
            order_id: cmd.order_id,
            order_number: cmd.order_number.clone(),
            shopper_id: cmd.shopper_id,
            lines: cmd.lines.clone(),
            total,
            shipping_address: cmd.shipping_address.clone(),
            payment_method: cmd.payment_method.clone(),
            notes: cmd.notes.clone(),
            occurred_at: cmd.occurred_at,
        }])
    }

    fn handle_cancel(&self, cmd: &Cancel) -> Result<Vec<OrderEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_order_id(cmd.order_id)?;

        if !self.is_cancellable() {
            return Err(DomainError::CancellationNotAllowed);
        }

        Ok(vec![OrderEvent::OrderCancelled {
            order_id: cmd.order_id,
            occurred_at: cmd.occurred_at,
        }])
    }

    fn handle_update_status(&self, cmd: &UpdateStatus) -> Result<Vec<OrderEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_order_id(cmd.order_id)?;

        if !status::is_valid_transition(self.status, cmd.new_status) {
            return Err(DomainError::invalid_transition(
                self.status.as_str(),
                cmd.new_status.as_str(),
            ));
        }

        Ok(vec![OrderEvent::StatusChanged {
            order_id: cmd.order_id,
            from: self.status,
            to: cmd.new_status,
            tracking: cmd.tracking.clone(),
            occurred_at: cmd.occurred_at,
        }])
    }

    fn handle_record_payment(&self, cmd: &RecordPayment) -> Result<Vec<OrderEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_order_id(cmd.order_id)?;

        if cmd.outcome == PaymentStatus::Unpaid {
            return Err(DomainError::validation(
                "payment outcome must be paid or failed",
            ));
        }
        if self.payment_status != PaymentStatus::Unpaid {
            return Err(DomainError::conflict("payment already settled"));
        }

        Ok(vec![OrderEvent::PaymentRecorded {
            order_id: cmd.order_id,
            outcome: cmd.outcome,
            occurred_at: cmd.occurred_at,
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storecore_core::AggregateId;

    fn test_order_id() -> OrderId {
        OrderId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn test_address() -> ShippingAddress {
        ShippingAddress {
            full_name: "Sam Carter".to_string(),
            line1: "1 High Street".to_string(),
            line2: None,
            city: "Leeds".to_string(),
            postal_code: "LS1 1AA".to_string(),
            country: "GB".to_string(),
        }
    }

    fn test_lines() -> Vec<OrderLine> {
        vec![
            OrderLine {
                unit_id: storecore_stock::UnitId::new(AggregateId::new()),
                quantity: 2,
                unit_price: 1_000,
                color_label: None,
                size_label: None,
            },
            OrderLine {
                unit_id: storecore_stock::UnitId::new(AggregateId::new()),
                quantity: 5,
                unit_price: 300,
                color_label: Some("black".to_string()),
                size_label: Some("S".to_string()),
            },
        ]
    }

    fn placed_order() -> Order {
        let id = test_order_id();
        let mut order = Order::empty(id);
        let events = order
            .handle(&OrderCommand::PlaceOrder(PlaceOrder {
                order_id: id,
                order_number: "SO-20260825-0001".to_string(),
                shopper_id: ShopperId::new(),
                lines: test_lines(),
                shipping_address: test_address(),
                payment_method: "card".to_string(),
                notes: None,
                occurred_at: test_time(),
            }))
            .unwrap();
        order.apply(&events[0]);
        order
    }

    fn transition(order: &mut Order, to: OrderStatus) {
        let events = order
            .handle(&OrderCommand::UpdateStatus(UpdateStatus {
                order_id: order.id_typed(),
                new_status: to,
                tracking: None,
                occurred_at: test_time(),
            }))
            .unwrap();
        order.apply(&events[0]);
    }

    #[test]
    fn place_order_freezes_lines_and_computes_total() {
        let order = placed_order();
        assert!(order.is_placed());
        assert_eq!(order.status(), OrderStatus::Pending);
        assert_eq!(order.payment_status(), PaymentStatus::Unpaid);
        assert_eq!(order.lines().len(), 2);
        assert_eq!(order.total(), 2 * 1_000 + 5 * 300);
        assert!(order.created_at().is_some());
    }

    #[test]
    fn place_order_rejects_empty_lines() {
        let id = test_order_id();
        let order = Order::empty(id);
        let err = order
            .handle(&OrderCommand::PlaceOrder(PlaceOrder {
                order_id: id,
                order_number: "SO-1".to_string(),
                shopper_id: ShopperId::new(),
                lines: vec![],
                shipping_address: test_address(),
                payment_method: "card".to_string(),
                notes: None,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn cancel_is_allowed_from_pending_and_processing_only() {
        let mut order = placed_order();
        transition(&mut order, OrderStatus::Processing);

        let events = order
            .handle(&OrderCommand::Cancel(Cancel {
                order_id: order.id_typed(),
                occurred_at: test_time(),
            }))
            .unwrap();
        order.apply(&events[0]);
        assert_eq!(order.status(), OrderStatus::Cancelled);
    }

    #[test]
    fn cancel_after_cancel_fails_without_second_event() {
        let mut order = placed_order();
        let cancel = OrderCommand::Cancel(Cancel {
            order_id: order.id_typed(),
            occurred_at: test_time(),
        });

        let events = order.handle(&cancel).unwrap();
        order.apply(&events[0]);

        let err = order.handle(&cancel).unwrap_err();
        assert_eq!(err, DomainError::CancellationNotAllowed);
    }

    #[test]
    fn shipped_orders_cannot_be_cancelled() {
        let mut order = placed_order();
        transition(&mut order, OrderStatus::Processing);
        transition(&mut order, OrderStatus::Shipped);

        let err = order
            .handle(&OrderCommand::Cancel(Cancel {
                order_id: order.id_typed(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert_eq!(err, DomainError::CancellationNotAllowed);
        assert_eq!(order.status(), OrderStatus::Shipped);
    }

    #[test]
    fn update_status_rejects_off_table_transitions() {
        let mut order = placed_order();
        transition(&mut order, OrderStatus::Processing);
        transition(&mut order, OrderStatus::Shipped);

        let err = order
            .handle(&OrderCommand::UpdateStatus(UpdateStatus {
                order_id: order.id_typed(),
                new_status: OrderStatus::Cancelled,
                tracking: None,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert_eq!(
            err,
            DomainError::InvalidTransition {
                from: "shipped".to_string(),
                to: "cancelled".to_string()
            }
        );
        assert_eq!(order.status(), OrderStatus::Shipped);
    }

    #[test]
    fn shipped_records_timestamp_and_tracking() {
        let mut order = placed_order();
        transition(&mut order, OrderStatus::Processing);

        let events = order
            .handle(&OrderCommand::UpdateStatus(UpdateStatus {
                order_id: order.id_typed(),
                new_status: OrderStatus::Shipped,
                tracking: Some(TrackingInfo {
                    tracking_number: "TRK-123".to_string(),
                    tracking_url: Some("https://carrier.example/TRK-123".to_string()),
                }),
                occurred_at: test_time(),
            }))
            .unwrap();
        order.apply(&events[0]);

        assert!(order.shipped_at().is_some());
        assert_eq!(order.tracking().unwrap().tracking_number, "TRK-123");

        transition(&mut order, OrderStatus::Delivered);
        assert!(order.delivered_at().is_some());
        assert_eq!(order.status(), OrderStatus::Delivered);
    }

    #[test]
    fn payment_outcome_is_recorded_once() {
        let mut order = placed_order();
        let events = order
            .handle(&OrderCommand::RecordPayment(RecordPayment {
                order_id: order.id_typed(),
                outcome: PaymentStatus::Paid,
                occurred_at: test_time(),
            }))
            .unwrap();
        order.apply(&events[0]);
        assert_eq!(order.payment_status(), PaymentStatus::Paid);

        let err = order
            .handle(&OrderCommand::RecordPayment(RecordPayment {
                order_id: order.id_typed(),
                outcome: PaymentStatus::Failed,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn handle_does_not_mutate_state() {
        let order = placed_order();
        let cmd = OrderCommand::UpdateStatus(UpdateStatus {
            order_id: order.id_typed(),
            new_status: OrderStatus::Processing,
            tracking: None,
            occurred_at: test_time(),
        });

        let events1 = order.handle(&cmd).unwrap();
        let events2 = order.handle(&cmd).unwrap();

        assert_eq!(order.status(), OrderStatus::Pending);
        assert_eq!(events1, events2);
    }
}
