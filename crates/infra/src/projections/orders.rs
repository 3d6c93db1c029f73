use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;

use storecore_core::{AggregateId, ShopperId};
use storecore_events::EventEnvelope;
use storecore_orders::{
    OrderEvent, OrderId, OrderLine, OrderStatus, PaymentStatus, ShippingAddress, TrackingInfo,
};

use crate::read_model::ReadStore;

/// Denormalized order for history pages and the admin dashboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderReadModel {
    pub order_id: OrderId,
    pub order_number: String,
    pub shopper_id: ShopperId,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub lines: Vec<OrderLine>,
    pub total: u64,
    pub shipping_address: ShippingAddress,
    pub payment_method: String,
    pub notes: Option<String>,
    pub tracking: Option<TrackingInfo>,
    pub created_at: DateTime<Utc>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Error)]
pub enum OrdersProjectionError {
    #[error("failed to deserialize order event: {0}")]
    Deserialize(String),
    #[error("event order_id does not match envelope aggregate_id")]
    AggregateMismatch,
    #[error("event for unknown order {0}")]
    UnknownOrder(OrderId),
    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Projects `orders.order` events into [`OrderReadModel`]s.
#[derive(Debug)]
pub struct OrdersProjection<S>
where
    S: ReadStore<OrderId, OrderReadModel>,
{
    store: S,
    cursors: RwLock<HashMap<AggregateId, u64>>,
}

impl<S> OrdersProjection<S>
where
    S: ReadStore<OrderId, OrderReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
        }
    }

    fn get_cursor(&self, aggregate_id: AggregateId) -> u64 {
        match self.cursors.read() {
            Ok(cursors) => *cursors.get(&aggregate_id).unwrap_or(&0),
            Err(_) => 0,
        }
    }

    fn update_cursor(&self, aggregate_id: AggregateId, seq: u64) {
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.insert(aggregate_id, seq);
        }
    }

    pub fn get(&self, order_id: &OrderId) -> Option<OrderReadModel> {
        self.store.get(order_id)
    }

    /// All orders, newest first (UUIDv7 order ids are time-ordered).
    pub fn list(&self) -> Vec<OrderReadModel> {
        let mut orders = self.store.list();
        orders.sort_by_key(|o| std::cmp::Reverse(*o.order_id.0.as_uuid()));
        orders
    }

    pub fn list_for_shopper(&self, shopper_id: ShopperId) -> Vec<OrderReadModel> {
        let mut orders: Vec<_> = self
            .store
            .list()
            .into_iter()
            .filter(|o| o.shopper_id == shopper_id)
            .collect();
        orders.sort_by_key(|o| std::cmp::Reverse(*o.order_id.0.as_uuid()));
        orders
    }

    pub fn list_with_status(&self, status: OrderStatus) -> Vec<OrderReadModel> {
        let mut orders: Vec<_> = self
            .store
            .list()
            .into_iter()
            .filter(|o| o.status == status)
            .collect();
        orders.sort_by_key(|o| std::cmp::Reverse(*o.order_id.0.as_uuid()));
        orders
    }

    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), OrdersProjectionError> {
        if envelope.aggregate_type() != "orders.order" {
            return Ok(());
        }

        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        let last = self.get_cursor(aggregate_id);
        if seq == 0 {
            return Err(OrdersProjectionError::NonMonotonicSequence { last, found: seq });
        }
        if seq <= last {
            return Ok(());
        }
        if seq != last + 1 && last != 0 {
            return Err(OrdersProjectionError::NonMonotonicSequence { last, found: seq });
        }

        let ev: OrderEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| OrdersProjectionError::Deserialize(e.to_string()))?;

        let order_id = match &ev {
            OrderEvent::OrderPlaced { order_id, .. }
            | OrderEvent::OrderCancelled { order_id, .. }
            | OrderEvent::StatusChanged { order_id, .. }
            | OrderEvent::PaymentRecorded { order_id, .. } => *order_id,
        };

        if order_id.0 != aggregate_id {
            return Err(OrdersProjectionError::AggregateMismatch);
        }

        match ev {
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
                self.store.upsert(
                    order_id,
                    OrderReadModel {
                        order_id,
                        order_number,
                        shopper_id,
                        status: OrderStatus::Pending,
                        payment_status: PaymentStatus::Unpaid,
                        lines,
                        total,
                        shipping_address,
                        payment_method,
                        notes,
                        tracking: None,
                        created_at: occurred_at,
                        shipped_at: None,
                        delivered_at: None,
                    },
                );
            }
            OrderEvent::OrderCancelled { order_id, .. } => {
                let mut rm = self
                    .store
                    .get(&order_id)
                    .ok_or(OrdersProjectionError::UnknownOrder(order_id))?;
                rm.status = OrderStatus::Cancelled;
                self.store.upsert(order_id, rm);
            }
            OrderEvent::StatusChanged {
                order_id,
                to,
                tracking,
                occurred_at,
                ..
            } => {
                let mut rm = self
                    .store
                    .get(&order_id)
                    .ok_or(OrdersProjectionError::UnknownOrder(order_id))?;
                rm.status = to;
                if tracking.is_some() {
                    rm.tracking = tracking;
                }
                match to {
                    OrderStatus::Shipped => rm.shipped_at = Some(occurred_at),
                    OrderStatus::Delivered => rm.delivered_at = Some(occurred_at),
                    _ => {}
                }
                self.store.upsert(order_id, rm);
            }
            OrderEvent::PaymentRecorded {
                order_id, outcome, ..
            } => {
                let mut rm = self
                    .store
                    .get(&order_id)
                    .ok_or(OrdersProjectionError::UnknownOrder(order_id))?;
                rm.payment_status = outcome;
                self.store.upsert(order_id, rm);
            }
        }

        self.update_cursor(aggregate_id, seq);
        Ok(())
    }

    /// Rebuild from a full event history (clears the store first).
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), OrdersProjectionError> {
        self.store.clear();
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.clear();
        }

        let mut envs: Vec<_> = envelopes.into_iter().collect();
        envs.sort_by_key(|e| (*e.aggregate_id().as_uuid().as_bytes(), e.sequence_number()));

        for env in &envs {
            self.apply_envelope(env)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use storecore_stock::UnitId;
    use uuid::Uuid;

    use crate::read_model::InMemoryReadStore;

    fn envelope(order_id: OrderId, seq: u64, ev: &OrderEvent) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            Uuid::now_v7(),
            order_id.0,
            "orders.order",
            seq,
            serde_json::to_value(ev).unwrap(),
        )
    }

    fn projection() -> OrdersProjection<Arc<InMemoryReadStore<OrderId, OrderReadModel>>> {
        OrdersProjection::new(Arc::new(InMemoryReadStore::new()))
    }

    fn placed(order_id: OrderId, shopper_id: ShopperId) -> OrderEvent {
        OrderEvent::OrderPlaced {
            order_id,
            order_number: "SO-20260825-0007".to_string(),
            shopper_id,
            lines: vec![OrderLine {
                unit_id: UnitId::new(AggregateId::new()),
                quantity: 2,
                unit_price: 900,
                color_label: None,
                size_label: None,
            }],
            total: 1_800,
            shipping_address: ShippingAddress {
                full_name: "Sam Carter".to_string(),
                line1: "1 High Street".to_string(),
                line2: None,
                city: "Leeds".to_string(),
                postal_code: "LS1 1AA".to_string(),
                country: "GB".to_string(),
            },
            payment_method: "card".to_string(),
            notes: None,
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn placed_then_status_changes_are_reflected() {
        let p = projection();
        let order_id = OrderId::new(AggregateId::new());
        let shopper = ShopperId::new();

        p.apply_envelope(&envelope(order_id, 1, &placed(order_id, shopper)))
            .unwrap();
        p.apply_envelope(&envelope(
            order_id,
            2,
            &OrderEvent::StatusChanged {
                order_id,
                from: OrderStatus::Pending,
                to: OrderStatus::Processing,
                tracking: None,
                occurred_at: Utc::now(),
            },
        ))
        .unwrap();

        let rm = p.get(&order_id).unwrap();
        assert_eq!(rm.status, OrderStatus::Processing);
        assert_eq!(rm.total, 1_800);
    }

    #[test]
    fn shopper_and_status_filters() {
        let p = projection();
        let alice = ShopperId::new();
        let bob = ShopperId::new();

        let a = OrderId::new(AggregateId::new());
        let b = OrderId::new(AggregateId::new());
        p.apply_envelope(&envelope(a, 1, &placed(a, alice))).unwrap();
        p.apply_envelope(&envelope(b, 1, &placed(b, bob))).unwrap();
        p.apply_envelope(&envelope(
            b,
            2,
            &OrderEvent::OrderCancelled {
                order_id: b,
                occurred_at: Utc::now(),
            },
        ))
        .unwrap();

        assert_eq!(p.list_for_shopper(alice).len(), 1);
        assert_eq!(p.list_with_status(OrderStatus::Cancelled).len(), 1);
        assert_eq!(p.list().len(), 2);
    }

    #[test]
    fn payment_outcome_is_reflected() {
        let p = projection();
        let order_id = OrderId::new(AggregateId::new());

        p.apply_envelope(&envelope(order_id, 1, &placed(order_id, ShopperId::new())))
            .unwrap();
        p.apply_envelope(&envelope(
            order_id,
            2,
            &OrderEvent::PaymentRecorded {
                order_id,
                outcome: PaymentStatus::Paid,
                occurred_at: Utc::now(),
            },
        ))
        .unwrap();

        assert_eq!(
            p.get(&order_id).unwrap().payment_status,
            PaymentStatus::Paid
        );
    }
}
