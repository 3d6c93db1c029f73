use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

use storecore_auth::{Role, ensure_admin, ensure_owner_or_admin};
use storecore_cart::{Cart, CartCommand, CartId, Clear, ClearMode};
use storecore_core::{ExpectedVersion, ShopperId};
use storecore_events::{EventBus, EventEnvelope};
use storecore_infra::{CommandDispatcher, EventStore};
use storecore_orders::{
    Cancel, Order, OrderCommand, OrderId, OrderLine, OrderStatus, PaymentStatus, PlaceOrder,
    RecordPayment, ShippingAddress, TrackingInfo, UpdateStatus,
};
use storecore_stock::{Release, StockCommand, StockUnit, UnitId};

use crate::error::ServiceError;
use crate::retry::{MAX_CONFLICT_RETRIES, with_conflict_retry, with_release_retry};

/// What the shopper submits at checkout.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub shipping_address: ShippingAddress,
    pub payment_method: String,
    pub notes: Option<String>,
}

/// Administrative status change.
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    pub new_status: OrderStatus,
    pub tracking: Option<TrackingInfo>,
}

/// Order orchestration: checkout, cancellation, fulfilment transitions and
/// payment outcomes.
///
/// Checkout does not touch the ledger: the cart's reservations already hold
/// the stock, and the commit-clear turns them into permanent commitments.
/// Cancellation is the single stock-returning path.
pub struct OrderService<S, B> {
    dispatcher: Arc<CommandDispatcher<S, B>>,
}

impl<S, B> Clone for OrderService<S, B> {
    fn clone(&self) -> Self {
        Self {
            dispatcher: Arc::clone(&self.dispatcher),
        }
    }
}

impl<S, B> OrderService<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(dispatcher: Arc<CommandDispatcher<S, B>>) -> Self {
        Self { dispatcher }
    }

    /// Checkout: freeze the current cart into an immutable order.
    ///
    /// Sequence: place the order from a snapshot of the cart, then
    /// commit-clear the cart with the append pinned to the snapshot's stream
    /// version. A cart line added while checkout is in flight fails the
    /// pinned clear instead of being deleted without ever entering an order;
    /// the placed order is compensated and the attempt re-snapshots the
    /// grown cart.
    pub fn create_order(
        &self,
        shopper_id: ShopperId,
        request: CheckoutRequest,
    ) -> Result<Order, ServiceError> {
        let cart_id = CartId::for_shopper(shopper_id);

        let mut attempt = 0;
        loop {
            match self.checkout_once(shopper_id, cart_id, &request) {
                Err(ServiceError::Conflict(msg)) if attempt < MAX_CONFLICT_RETRIES => {
                    attempt += 1;
                    tracing::debug!(attempt, %msg, "cart changed during checkout, re-snapshotting");
                }
                other => return other,
            }
        }
    }

    /// One checkout attempt against a single cart snapshot.
    ///
    /// If the clear cannot be committed the order is cancelled again (without
    /// a release, since the reservations still belong to the cart lines),
    /// leaving the shopper exactly where they started.
    fn checkout_once(
        &self,
        shopper_id: ShopperId,
        cart_id: CartId,
        request: &CheckoutRequest,
    ) -> Result<Order, ServiceError> {
        let (cart, cart_version) = self
            .dispatcher
            .load_with_version::<Cart>(cart_id.0, |id| Cart::empty(CartId(id)))
            .map_err(ServiceError::from_generic_dispatch)?;

        if cart.is_empty() {
            return Err(ServiceError::EmptyCart);
        }

        let lines: Vec<OrderLine> = cart
            .lines()
            .iter()
            .map(|l| OrderLine {
                unit_id: l.unit_id,
                quantity: l.quantity,
                unit_price: l.unit_price,
                color_label: l.color_label.clone(),
                size_label: l.size_label.clone(),
            })
            .collect();

        let now = Utc::now();
        let order_id = OrderId::new(storecore_core::AggregateId::new());
        let order_number = order_number_for(order_id, now);

        with_conflict_retry(|| {
            self.dispatcher.dispatch::<Order>(
                order_id.0,
                "orders.order",
                OrderCommand::PlaceOrder(PlaceOrder {
                    order_id,
                    order_number: order_number.clone(),
                    shopper_id,
                    lines: lines.clone(),
                    shipping_address: request.shipping_address.clone(),
                    payment_method: request.payment_method.clone(),
                    notes: request.notes.clone(),
                    occurred_at: now,
                }),
                |id| Order::empty(OrderId(id)),
            )
        })
        .map_err(|e| ServiceError::from_order_dispatch(order_id, e))?;

        // Commit-clear: delete the lines, leave the ledger decremented. The
        // pinned version guarantees the cleared lines are exactly the frozen
        // lines; anything newer fails the append.
        let clear_result = self.dispatcher.dispatch_pinned::<Cart>(
            cart_id.0,
            "cart.cart",
            CartCommand::Clear(Clear {
                cart_id,
                mode: ClearMode::Committed,
                occurred_at: Utc::now(),
            }),
            |id| Cart::empty(CartId(id)),
            ExpectedVersion::Exact(cart_version),
        );

        if let Err(err) = clear_result {
            tracing::warn!(%order_id, ?err, "commit-clear failed, cancelling the new order");
            let cancel = with_conflict_retry(|| {
                self.dispatcher.dispatch::<Order>(
                    order_id.0,
                    "orders.order",
                    OrderCommand::Cancel(Cancel {
                        order_id,
                        occurred_at: Utc::now(),
                    }),
                    |id| Order::empty(OrderId(id)),
                )
            });
            if let Err(cancel_err) = cancel {
                tracing::error!(%order_id, ?cancel_err, "compensating cancel failed");
            }
            return Err(ServiceError::from_generic_dispatch(err));
        }

        tracing::info!(%order_id, %order_number, total = self.total_of(&lines), "order placed");
        self.load_order(order_id)
    }

    /// Authoritative, ownership-checked read of a single order.
    pub fn get_order(
        &self,
        actor: ShopperId,
        roles: &[Role],
        order_id: OrderId,
    ) -> Result<Order, ServiceError> {
        let order = self.load_order(order_id)?;
        let owner = order
            .shopper_id()
            .ok_or_else(|| ServiceError::Internal("order has no shopper".to_string()))?;
        ensure_owner_or_admin(actor, roles, owner).map_err(|_| ServiceError::Forbidden)?;
        Ok(order)
    }

    /// Cancel an order and return its committed quantities to the ledger.
    ///
    /// The cancel event wins or loses the append race on the order stream, so
    /// at most one caller proceeds to the releases; a second cancel fails with
    /// `CancellationNotAllowed` and releases nothing.
    pub fn cancel_order(
        &self,
        actor: ShopperId,
        roles: &[Role],
        order_id: OrderId,
    ) -> Result<Order, ServiceError> {
        let order = self.load_order(order_id)?;
        let owner = order
            .shopper_id()
            .ok_or_else(|| ServiceError::Internal("order has no shopper".to_string()))?;
        ensure_owner_or_admin(actor, roles, owner).map_err(|_| ServiceError::Forbidden)?;

        self.cancel_and_release(&order)?;

        tracing::info!(%order_id, "order cancelled, stock returned");
        self.load_order(order_id)
    }

    /// Administrative status transition.
    ///
    /// A transition *to* `cancelled` routes through the cancellation path so
    /// the committed stock comes back; every other transition has no ledger
    /// effect.
    pub fn update_status(
        &self,
        roles: &[Role],
        order_id: OrderId,
        update: StatusUpdate,
    ) -> Result<Order, ServiceError> {
        ensure_admin(roles).map_err(|_| ServiceError::Forbidden)?;

        let order = self.load_order(order_id)?;

        if update.new_status == OrderStatus::Cancelled {
            return match self.cancel_and_release(&order) {
                Ok(()) => self.load_order(order_id),
                // Admins speak the transition-table language.
                Err(ServiceError::CancellationNotAllowed) => Err(ServiceError::InvalidTransition {
                    from: order.status().as_str().to_string(),
                    to: OrderStatus::Cancelled.as_str().to_string(),
                }),
                Err(other) => Err(other),
            };
        }

        with_conflict_retry(|| {
            self.dispatcher.dispatch::<Order>(
                order_id.0,
                "orders.order",
                OrderCommand::UpdateStatus(UpdateStatus {
                    order_id,
                    new_status: update.new_status,
                    tracking: update.tracking.clone(),
                    occurred_at: Utc::now(),
                }),
                |id| Order::empty(OrderId(id)),
            )
        })
        .map_err(|e| ServiceError::from_order_dispatch(order_id, e))?;

        self.load_order(order_id)
    }

    /// Record a payment gateway outcome.
    ///
    /// A failed payment cancels the order (returning its stock) while it is
    /// still cancellable; a failure arriving after shipment only records the
    /// payment state.
    pub fn record_payment(
        &self,
        order_id: OrderId,
        outcome: PaymentStatus,
    ) -> Result<Order, ServiceError> {
        let order = self.load_order(order_id)?;

        with_conflict_retry(|| {
            self.dispatcher.dispatch::<Order>(
                order_id.0,
                "orders.order",
                OrderCommand::RecordPayment(RecordPayment {
                    order_id,
                    outcome,
                    occurred_at: Utc::now(),
                }),
                |id| Order::empty(OrderId(id)),
            )
        })
        .map_err(|e| ServiceError::from_order_dispatch(order_id, e))?;

        if outcome == PaymentStatus::Failed {
            match self.cancel_and_release(&order) {
                Ok(()) => tracing::info!(%order_id, "payment failed, order cancelled"),
                Err(ServiceError::CancellationNotAllowed) => {
                    tracing::warn!(%order_id, "payment failed on a non-cancellable order");
                }
                Err(other) => return Err(other),
            }
        }

        self.load_order(order_id)
    }

    /// Dispatch the cancel, then release each line exactly once.
    fn cancel_and_release(&self, order: &Order) -> Result<(), ServiceError> {
        let order_id = order.id_typed();

        with_conflict_retry(|| {
            self.dispatcher.dispatch::<Order>(
                order_id.0,
                "orders.order",
                OrderCommand::Cancel(Cancel {
                    order_id,
                    occurred_at: Utc::now(),
                }),
                |id| Order::empty(OrderId(id)),
            )
        })
        .map_err(|e| ServiceError::from_order_dispatch(order_id, e))?;

        for line in order.lines() {
            self.release(line.unit_id, line.quantity)?;
        }
        Ok(())
    }

    // The cancel event is already committed when these releases run, so a
    // conflict is never allowed to exhaust a budget: release appends retry
    // until they land.
    fn release(&self, unit_id: UnitId, qty: u32) -> Result<(), ServiceError> {
        with_release_retry(|| {
            self.dispatcher.dispatch::<StockUnit>(
                unit_id.0,
                "stock.unit",
                StockCommand::Release(Release {
                    unit_id,
                    qty,
                    occurred_at: Utc::now(),
                }),
                |id| StockUnit::empty(UnitId(id)),
            )
        })
        .map(|_| ())
        .map_err(|e| ServiceError::from_unit_dispatch(unit_id, e))
    }

    fn load_order(&self, order_id: OrderId) -> Result<Order, ServiceError> {
        let order = self
            .dispatcher
            .load::<Order>(order_id.0, |id| Order::empty(OrderId(id)))
            .map_err(|e| ServiceError::from_order_dispatch(order_id, e))?;
        if !order.is_placed() {
            return Err(ServiceError::OrderNotFound(order_id));
        }
        Ok(order)
    }

    fn total_of(&self, lines: &[OrderLine]) -> u64 {
        lines.iter().map(OrderLine::line_total).sum()
    }
}

/// Human-facing order number: date plus a short suffix from the order id.
/// UUIDv7 ids make collisions within a day vanishingly unlikely for a small
/// shop, and the uuid remains the real identifier.
fn order_number_for(order_id: OrderId, at: DateTime<Utc>) -> String {
    let bytes = order_id.0.as_uuid().as_bytes();
    let suffix = u32::from_be_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]);
    format!("SO-{}-{:06X}", at.format("%Y%m%d"), suffix & 0xFF_FFFF)
}
