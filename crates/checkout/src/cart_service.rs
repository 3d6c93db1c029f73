use std::sync::Arc;

use chrono::Utc;
use serde_json::Value as JsonValue;

use storecore_cart::{
    AddLine, Cart, CartCommand, CartId, Clear, ClearMode, RemoveLine, SetLineQuantity,
};
use storecore_core::ShopperId;
use storecore_events::{EventBus, EventEnvelope};
use storecore_infra::{CommandDispatcher, EventStore};
use storecore_stock::{Release, Reserve, StockCommand, StockUnit, UnitId};

use crate::error::ServiceError;
use crate::retry::{with_conflict_retry, with_release_retry};

/// Cart orchestration: every line mutation is paired with the matching ledger
/// reserve/release, reserve-first.
///
/// Ordering rule: the reservation happens *before* the cart line mutation, so
/// a crash in between leaves an orphaned reservation (recoverable) instead of
/// a cart line with no stock behind it (oversell). If the cart append fails, a
/// compensating release is issued.
pub struct CartService<S, B> {
    dispatcher: Arc<CommandDispatcher<S, B>>,
}

impl<S, B> Clone for CartService<S, B> {
    fn clone(&self) -> Self {
        Self {
            dispatcher: Arc::clone(&self.dispatcher),
        }
    }
}

impl<S, B> CartService<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(dispatcher: Arc<CommandDispatcher<S, B>>) -> Self {
        Self { dispatcher }
    }

    /// Rehydrate the shopper's cart (authoritative, not a projection).
    pub fn view_cart(&self, shopper_id: ShopperId) -> Result<Cart, ServiceError> {
        let cart_id = CartId::for_shopper(shopper_id);
        self.dispatcher
            .load::<Cart>(cart_id.0, |id| Cart::empty(CartId(id)))
            .map_err(ServiceError::from_generic_dispatch)
    }

    /// Add `qty` of a unit to the cart.
    ///
    /// Adding a unit that already has a line merges into it: the line's new
    /// quantity is `existing + qty`, and only the delta is reserved.
    pub fn add_item(
        &self,
        shopper_id: ShopperId,
        unit_id: UnitId,
        qty: u32,
    ) -> Result<Cart, ServiceError> {
        if qty == 0 {
            return Err(ServiceError::Validation("qty must be positive".to_string()));
        }

        let cart_id = CartId::for_shopper(shopper_id);
        let cart = self.view_cart(shopper_id)?;

        if let Some(line) = cart.line(unit_id) {
            let merged = line.quantity.checked_add(qty).ok_or_else(|| {
                ServiceError::Validation("quantity overflows".to_string())
            })?;
            return self.change_quantity(shopper_id, unit_id, merged);
        }

        let unit = self.load_unit(unit_id)?;

        // Reserve first; the ledger is the gate.
        self.reserve(unit_id, qty)?;

        let result = with_conflict_retry(|| {
            self.dispatcher.dispatch::<Cart>(
                cart_id.0,
                "cart.cart",
                CartCommand::AddLine(AddLine {
                    cart_id,
                    unit_id,
                    qty,
                    unit_price: unit.unit_price(),
                    color_label: unit.color_label().map(str::to_string),
                    size_label: unit.size_label().map(str::to_string),
                    occurred_at: Utc::now(),
                }),
                |id| Cart::empty(CartId(id)),
            )
        });

        if let Err(err) = result {
            // Compensate: hand the reservation back before reporting failure.
            self.release_quietly(unit_id, qty);
            return Err(ServiceError::from_generic_dispatch(err));
        }

        self.view_cart(shopper_id)
    }

    /// Set the absolute quantity of an existing line.
    ///
    /// Only the difference moves through the ledger: growing the line reserves
    /// the delta, shrinking it releases the delta.
    pub fn change_quantity(
        &self,
        shopper_id: ShopperId,
        unit_id: UnitId,
        new_qty: u32,
    ) -> Result<Cart, ServiceError> {
        if new_qty == 0 {
            return Err(ServiceError::Validation(
                "qty must be positive; remove the line instead".to_string(),
            ));
        }

        let cart_id = CartId::for_shopper(shopper_id);
        let cart = self.view_cart(shopper_id)?;
        let line = cart
            .line(unit_id)
            .ok_or(ServiceError::LineNotFound(unit_id))?;
        let old_qty = line.quantity;

        if new_qty == old_qty {
            return Ok(cart);
        }

        if new_qty > old_qty {
            self.reserve(unit_id, new_qty - old_qty)?;
        }

        let result = with_conflict_retry(|| {
            self.dispatcher.dispatch::<Cart>(
                cart_id.0,
                "cart.cart",
                CartCommand::SetLineQuantity(SetLineQuantity {
                    cart_id,
                    unit_id,
                    qty: new_qty,
                    occurred_at: Utc::now(),
                }),
                |id| Cart::empty(CartId(id)),
            )
        });

        match result {
            Ok(_) => {
                if new_qty < old_qty {
                    self.release(unit_id, old_qty - new_qty)?;
                }
                self.view_cart(shopper_id)
            }
            Err(err) => {
                if new_qty > old_qty {
                    self.release_quietly(unit_id, new_qty - old_qty);
                }
                Err(ServiceError::from_generic_dispatch(err))
            }
        }
    }

    /// Remove a line, releasing its full reserved quantity.
    pub fn remove_item(
        &self,
        shopper_id: ShopperId,
        unit_id: UnitId,
    ) -> Result<Cart, ServiceError> {
        let cart_id = CartId::for_shopper(shopper_id);
        let cart = self.view_cart(shopper_id)?;
        let line = cart
            .line(unit_id)
            .ok_or(ServiceError::LineNotFound(unit_id))?;
        let qty = line.quantity;

        with_conflict_retry(|| {
            self.dispatcher.dispatch::<Cart>(
                cart_id.0,
                "cart.cart",
                CartCommand::RemoveLine(RemoveLine {
                    cart_id,
                    unit_id,
                    occurred_at: Utc::now(),
                }),
                |id| Cart::empty(CartId(id)),
            )
        })
        .map_err(ServiceError::from_generic_dispatch)?;

        // Line removal won the append race, so this release happens exactly
        // once for this line.
        self.release(unit_id, qty)?;

        self.view_cart(shopper_id)
    }

    /// Empty the cart, releasing every line's reservation.
    ///
    /// Clearing an already-empty cart is a no-op.
    pub fn clear_cart(&self, shopper_id: ShopperId) -> Result<Cart, ServiceError> {
        let cart_id = CartId::for_shopper(shopper_id);
        let cart = self.view_cart(shopper_id)?;

        if cart.is_empty() {
            return Ok(cart);
        }

        with_conflict_retry(|| {
            self.dispatcher.dispatch::<Cart>(
                cart_id.0,
                "cart.cart",
                CartCommand::Clear(Clear {
                    cart_id,
                    mode: ClearMode::Released,
                    occurred_at: Utc::now(),
                }),
                |id| Cart::empty(CartId(id)),
            )
        })
        .map_err(ServiceError::from_generic_dispatch)?;

        for line in cart.lines() {
            self.release(line.unit_id, line.quantity)?;
        }

        self.view_cart(shopper_id)
    }

    fn load_unit(&self, unit_id: UnitId) -> Result<StockUnit, ServiceError> {
        let unit = self
            .dispatcher
            .load::<StockUnit>(unit_id.0, |id| StockUnit::empty(UnitId(id)))
            .map_err(|e| ServiceError::from_unit_dispatch(unit_id, e))?;
        if !unit.is_registered() {
            return Err(ServiceError::UnitNotFound(unit_id));
        }
        Ok(unit)
    }

    fn reserve(&self, unit_id: UnitId, qty: u32) -> Result<(), ServiceError> {
        with_conflict_retry(|| {
            self.dispatcher.dispatch::<StockUnit>(
                unit_id.0,
                "stock.unit",
                StockCommand::Reserve(Reserve {
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

    // Releases compensate a write that is already committed (or hand back a
    // reservation just taken), so conflicts retry until the append lands
    // rather than exhausting a budget and stranding the stock.
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

    /// Best-effort compensating release; the primary error is what the caller
    /// should see, so a failed compensation is only logged.
    fn release_quietly(&self, unit_id: UnitId, qty: u32) {
        if let Err(err) = self.release(unit_id, qty) {
            tracing::error!(%unit_id, qty, ?err, "compensating release failed");
        }
    }
}
